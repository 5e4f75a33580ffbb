//! In-memory collaborators for tests, demos, and single-process setups.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use hearthgate_protocol::DecodedMessage;
use hearthgate_protocol::command::server;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    Abilities, CharacterRecord, ClientKey, Container, DatabaseService, DbBody, DbFailure,
    DbRequest, DbResponse, FirstLoginGrant, Gameplay, ItemRecord, LoadedCharacter, LoginGateway,
    PendingLogin, PlayerAction, SpawnPoint, StartingStats, StatusSnapshot, WorldProvider,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// A [`LoginGateway`] backed by a map of issued tickets.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    pending: Mutex<HashMap<u32, PendingLogin>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket.
    pub fn register(&self, login_id: u32, account: &str, char_name: &str) {
        lock(&self.pending).insert(
            login_id,
            PendingLogin {
                account: account.to_string(),
                char_name: char_name.to_string(),
            },
        );
    }

    /// Returns `true` while the ticket has not been consumed.
    pub fn is_pending(&self, login_id: u32) -> bool {
        lock(&self.pending).contains_key(&login_id)
    }
}

impl LoginGateway for MemoryGateway {
    fn lookup_pending_login(&self, login_id: u32) -> Option<PendingLogin> {
        lock(&self.pending).get(&login_id).cloned()
    }

    fn consume_pending_login(&self, login_id: u32) {
        lock(&self.pending).remove(&login_id);
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// A [`DatabaseService`] that only records what was submitted. Tests
/// answer by building [`DbResponse`]s themselves.
#[derive(Debug, Default)]
pub struct RecordingDatabase {
    requests: Mutex<Vec<DbRequest>>,
}

impl RecordingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything submitted so far.
    pub fn requests(&self) -> Vec<DbRequest> {
        lock(&self.requests).clone()
    }

    /// Drains the submitted requests.
    pub fn take(&self) -> Vec<DbRequest> {
        std::mem::take(&mut *lock(&self.requests))
    }
}

impl DatabaseService for RecordingDatabase {
    fn submit(&self, request: DbRequest) {
        lock(&self.requests).push(request);
    }
}

/// Stored rows for one character in a [`MemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct StoredCharacter {
    pub record: CharacterRecord,
    pub bag: Vec<ItemRecord>,
    pub equipment: Vec<ItemRecord>,
    pub bank: Vec<ItemRecord>,
}

/// A [`DatabaseService`] that answers every request immediately from an
/// in-memory table, sending responses down a channel.
#[derive(Debug)]
pub struct MemoryDatabase {
    characters: Mutex<HashMap<String, StoredCharacter>>,
    /// Which character each live key asked for.
    sessions: Mutex<HashMap<ClientKey, String>>,
    responses: mpsc::UnboundedSender<DbResponse>,
}

impl MemoryDatabase {
    /// A database and the receiving end of its response link.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DbResponse>) {
        let (responses, rx) = mpsc::unbounded_channel();
        let db = Self {
            characters: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            responses,
        };
        (db, rx)
    }

    pub fn insert(&self, character: StoredCharacter) {
        lock(&self.characters).insert(character.record.name.to_lowercase(), character);
    }

    pub fn get(&self, name: &str) -> Option<StoredCharacter> {
        lock(&self.characters).get(&name.to_lowercase()).cloned()
    }

    fn stored_for(&self, key: ClientKey) -> Option<StoredCharacter> {
        let name = lock(&self.sessions).get(&key).cloned()?;
        self.get(&name)
    }

    fn respond(&self, key: ClientKey, body: DbBody) {
        if self.responses.send(DbResponse::new(key, body)).is_err() {
            warn!(client_key = %key, "Database response link closed");
        }
    }
}

impl DatabaseService for MemoryDatabase {
    fn submit(&self, request: DbRequest) {
        debug!(client_key = %request.client_key(), ?request, "Database request");
        match request {
            DbRequest::GetCharacterRecord { account, char_name, client_key, .. } => {
                let mut sessions = lock(&self.sessions);
                // One live session per character, so an older key for the
                // same name belongs to a session that has ended.
                sessions.retain(|key, name| *key != client_key && !name.eq_ignore_ascii_case(&char_name));
                let result = match self.get(&char_name) {
                    Some(stored) if stored.record.account == account => {
                        sessions.insert(client_key, char_name);
                        Ok(stored.record)
                    }
                    _ => Err(DbFailure::NotFound),
                };
                drop(sessions);
                self.respond(client_key, DbBody::CharacterRecord(result));
            }
            DbRequest::QueryItems { client_key, container } => {
                let result = self
                    .stored_for(client_key)
                    .map(|stored| match container {
                        Container::Bag => stored.bag,
                        Container::Equipment => stored.equipment,
                        Container::Bank => stored.bank,
                    })
                    .ok_or(DbFailure::NotFound);
                self.respond(client_key, DbBody::Items { container, result });
            }
            DbRequest::QueryMagic { client_key } => {
                self.respond(client_key, DbBody::Magic(Ok(Vec::new())));
            }
            DbRequest::QueryTaskInfo { client_key } => {
                self.respond(client_key, DbBody::TaskInfo(Ok(Vec::new())));
            }
            DbRequest::QueryUpgradeItem { client_key } => {
                self.respond(client_key, DbBody::UpgradeItems(Ok(Vec::new())));
            }
            DbRequest::QueryPetBank { client_key } => {
                self.respond(client_key, DbBody::PetBank(Ok(Vec::new())));
            }
            DbRequest::QueryCommunity { client_key } => {
                self.respond(client_key, DbBody::Community(Ok(Default::default())));
            }
            DbRequest::SaveCharacter { client_key, record, bag } => {
                let mut characters = lock(&self.characters);
                let stored = characters.entry(record.name.to_lowercase()).or_default();
                stored.record = record;
                stored.bag = bag;
                drop(characters);
                self.respond(client_key, DbBody::Saved(Ok(())));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// A [`WorldProvider`] with one spawn point and one grant for every job.
#[derive(Debug, Clone)]
pub struct StaticWorld {
    pub server_name: String,
    pub spawn: SpawnPoint,
    pub starting_stats: StartingStats,
    pub grant: FirstLoginGrant,
}

impl Default for StaticWorld {
    fn default() -> Self {
        Self {
            server_name: "hearthgate".to_string(),
            spawn: SpawnPoint {
                map: "0".to_string(),
                x: 330,
                y: 270,
                direction: 4,
            },
            starting_stats: StartingStats { hp: 19, mp: 17 },
            grant: FirstLoginGrant {
                level: 1,
                gold: 100,
                items: Vec::new(),
            },
        }
    }
}

impl WorldProvider for StaticWorld {
    fn server_name(&self) -> String {
        self.server_name.clone()
    }

    fn starting_stats(&self, _job: u8) -> StartingStats {
        self.starting_stats
    }

    fn spawn_point(&self, record: &CharacterRecord) -> SpawnPoint {
        if record.map.is_empty() {
            self.spawn.clone()
        } else {
            SpawnPoint {
                map: record.map.clone(),
                x: record.x,
                y: record.y,
                direction: self.spawn.direction,
            }
        }
    }

    fn first_login_grant(&self, _job: u8) -> FirstLoginGrant {
        self.grant.clone()
    }
}

// ---------------------------------------------------------------------------
// Gameplay
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GameplayLog {
    in_world: HashMap<ClientKey, LoadedCharacter>,
    dead: HashSet<ClientKey>,
    entered: Vec<ClientKey>,
    left: Vec<ClientKey>,
    actions: Vec<(ClientKey, PlayerAction)>,
}

/// A [`Gameplay`] that records every call and echoes chat back.
///
/// Abilities come straight from the loaded record; every other action
/// is accepted without effect.
#[derive(Debug, Default)]
pub struct ScriptedGameplay {
    log: Mutex<GameplayLog>,
}

impl ScriptedGameplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interactive(&self, key: ClientKey, interactive: bool) {
        let mut log = lock(&self.log);
        if interactive {
            log.dead.remove(&key);
        } else {
            log.dead.insert(key);
        }
    }

    /// The character `key` entered the world with, if it did.
    pub fn character(&self, key: ClientKey) -> Option<LoadedCharacter> {
        lock(&self.log).in_world.get(&key).cloned()
    }

    pub fn entered(&self) -> Vec<ClientKey> {
        lock(&self.log).entered.clone()
    }

    pub fn left(&self) -> Vec<ClientKey> {
        lock(&self.log).left.clone()
    }

    pub fn actions(&self) -> Vec<(ClientKey, PlayerAction)> {
        lock(&self.log).actions.clone()
    }
}

impl Gameplay for ScriptedGameplay {
    fn enter_world(&self, key: ClientKey, character: &LoadedCharacter, _spawn: &SpawnPoint) {
        let mut log = lock(&self.log);
        log.in_world.insert(key, character.clone());
        log.entered.push(key);
    }

    fn leave_world(&self, key: ClientKey) {
        let mut log = lock(&self.log);
        log.in_world.remove(&key);
        log.left.push(key);
    }

    fn is_interactive(&self, key: ClientKey) -> bool {
        !lock(&self.log).dead.contains(&key)
    }

    fn recompute_abilities(&self, key: ClientKey) -> Abilities {
        let log = lock(&self.log);
        let Some(character) = log.in_world.get(&key) else {
            return Abilities::default();
        };
        let record = &character.record;
        Abilities {
            level: record.level,
            hp: record.hp,
            max_hp: record.hp,
            mp: record.mp,
            max_mp: record.mp,
            ..Abilities::default()
        }
    }

    fn status(&self, key: ClientKey) -> StatusSnapshot {
        let log = lock(&self.log);
        let weight = log
            .in_world
            .get(&key)
            .map_or(0, |c| u16::try_from(c.bag.len()).unwrap_or(u16::MAX));
        StatusSnapshot {
            weight,
            max_weight: 100,
            ..StatusSnapshot::default()
        }
    }

    fn perform(&self, key: ClientKey, action: PlayerAction) -> Vec<DecodedMessage> {
        let reply = match &action {
            PlayerAction::Say { text } => {
                vec![DecodedMessage::new(server::SYS_MESSAGE).with_text(text)]
            }
            _ => Vec::new(),
        };
        lock(&self.log).actions.push((key, action));
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str) -> StoredCharacter {
        StoredCharacter {
            record: CharacterRecord {
                name: name.into(),
                account: "acct".into(),
                ..CharacterRecord::default()
            },
            ..StoredCharacter::default()
        }
    }

    fn lookup(db: &MemoryDatabase, key: ClientKey, name: &str) {
        db.submit(DbRequest::GetCharacterRecord {
            account: "acct".into(),
            server: "hearthgate".into(),
            char_name: name.into(),
            client_key: key,
        });
    }

    #[test]
    fn test_repeated_logins_do_not_grow_session_map() {
        let (db, _link) = MemoryDatabase::new();
        db.insert(stored("Hero"));
        db.insert(stored("Sidekick"));

        for _ in 0..10 {
            lookup(&db, ClientKey::next(), "Hero");
        }
        lookup(&db, ClientKey::next(), "Sidekick");

        assert_eq!(lock(&db.sessions).len(), 2);
    }

    #[test]
    fn test_failed_lookup_leaves_no_session() {
        let (db, mut link) = MemoryDatabase::new();
        let key = ClientKey::next();

        lookup(&db, key, "Nobody");

        assert!(lock(&db.sessions).is_empty());
        let response = link.try_recv().unwrap();
        assert!(matches!(response.body, DbBody::CharacterRecord(Err(DbFailure::NotFound))));
    }

    #[test]
    fn test_latest_key_gets_the_items() {
        let (db, mut link) = MemoryDatabase::new();
        db.insert(stored("Hero"));
        let old = ClientKey::next();
        let new = ClientKey::next();
        lookup(&db, old, "Hero");
        lookup(&db, new, "Hero");
        while link.try_recv().is_ok() {}

        db.submit(DbRequest::QueryItems { client_key: old, container: Container::Bag });
        let response = link.try_recv().unwrap();
        assert!(matches!(response.body, DbBody::Items { result: Err(DbFailure::NotFound), .. }));
    }
}
