//! The collaborators a session talks to.
//!
//! Sessions never reach for globals: everything they need from the rest
//! of the game process is handed to them in one [`Services`] bundle at
//! construction. All calls are synchronous and must not block; anything
//! slow (the database) is fire-and-forget with the answer arriving later
//! as a [`DbResponse`](crate::DbResponse).

use std::sync::Arc;

use hearthgate_protocol::DecodedMessage;
use serde::{Deserialize, Serialize};

use crate::{
    CharacterRecord, ClientKey, CommunityInfo, DbRequest, DbResponse, ItemRecord, MagicRecord,
    PlayerRegistry, TaskRecord,
};

// ---------------------------------------------------------------------------
// Login gateway
// ---------------------------------------------------------------------------

/// What the login gateway remembers about a ticket it issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub account: String,
    pub char_name: String,
}

/// The login/selection server's record of clients it has handed off.
pub trait LoginGateway: Send + Sync + 'static {
    fn lookup_pending_login(&self, login_id: u32) -> Option<PendingLogin>;

    /// Marks the ticket used. Called once the character is bound.
    fn consume_pending_login(&self, login_id: u32);
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Outbound side of the database link.
pub trait DatabaseService: Send + Sync + 'static {
    fn submit(&self, request: DbRequest);
}

/// Inbound side of the database link: where responses are delivered.
/// The server's session table implements this.
pub trait DbResponseSink: Send + Sync + 'static {
    fn deliver(&self, response: DbResponse);
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub map: String,
    pub x: u16,
    pub y: u16,
    pub direction: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingStats {
    pub hp: u16,
    pub mp: u16,
}

/// What a brand-new character receives on its first world entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstLoginGrant {
    pub level: u16,
    pub gold: u32,
    pub items: Vec<ItemRecord>,
}

/// Static world data.
pub trait WorldProvider: Send + Sync + 'static {
    /// Name of this game server, sent with character lookups.
    fn server_name(&self) -> String;

    fn starting_stats(&self, job: u8) -> StartingStats;

    /// Where `record` appears on entry. May differ from the stored
    /// position (first login, a map that no longer exists).
    fn spawn_point(&self, record: &CharacterRecord) -> SpawnPoint;

    fn first_login_grant(&self, job: u8) -> FirstLoginGrant;
}

// ---------------------------------------------------------------------------
// Gameplay
// ---------------------------------------------------------------------------

/// Everything the seven loads (and community) produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedCharacter {
    pub record: CharacterRecord,
    pub bag: Vec<ItemRecord>,
    pub equipment: Vec<ItemRecord>,
    pub bank: Vec<ItemRecord>,
    pub magic: Vec<MagicRecord>,
    pub tasks: Vec<TaskRecord>,
    pub upgrade_items: Vec<ItemRecord>,
    pub pet_bank: Vec<ItemRecord>,
    pub community: CommunityInfo,
}

/// Derived combat stats, recomputed on world entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    pub level: u16,
    pub ac: u16,
    pub mac: u16,
    pub dc: u16,
    pub mc: u16,
    pub sc: u16,
    pub hp: u16,
    pub max_hp: u16,
    pub mp: u16,
    pub max_mp: u16,
}

/// Appearance and carry state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub feature: u32,
    pub weight: u16,
    pub max_weight: u16,
    pub wear_weight: u16,
    pub max_wear_weight: u16,
}

/// An in-game command, already decoded from its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Turn { direction: u8 },
    Walk { x: u16, y: u16, direction: u8 },
    Run { x: u16, y: u16, direction: u8 },
    Hit { x: u16, y: u16, direction: u8 },
    Spell { magic_id: u16, x: u16, y: u16, target: u32 },
    Say { text: String },
    PickUp { x: u16, y: u16 },
    DropItem { make_index: u32, name: String },
    TakeOnItem { make_index: u32, slot: u16 },
    TakeOffItem { make_index: u32, slot: u16 },
    EatItem { make_index: u32 },
    QueryBag,
    Respawn,
}

/// The game simulation.
pub trait Gameplay: Send + Sync + 'static {
    /// The player is placed into the world.
    fn enter_world(&self, key: ClientKey, character: &LoadedCharacter, spawn: &SpawnPoint);

    /// The player's session is going away.
    fn leave_world(&self, key: ClientKey);

    /// `false` while the player is dead.
    fn is_interactive(&self, key: ClientKey) -> bool;

    fn recompute_abilities(&self, key: ClientKey) -> Abilities;

    fn status(&self, key: ClientKey) -> StatusSnapshot;

    /// Performs `action`; returns messages for the acting client.
    fn perform(&self, key: ClientKey, action: PlayerAction) -> Vec<DecodedMessage>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Every collaborator a session needs.
#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn LoginGateway>,
    pub database: Arc<dyn DatabaseService>,
    pub world: Arc<dyn WorldProvider>,
    pub gameplay: Arc<dyn Gameplay>,
    pub registry: Arc<PlayerRegistry>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
