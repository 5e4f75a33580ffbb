//! The per-connection state machine.
//!
//! A [`Session`] owns everything about one client that is not the socket:
//! both reassembly buffers, the current [`SessionState`], the bound
//! player, the load gate, and the character data collected on the way
//! in. It never does I/O. Each input method returns an [`Outcome`]
//! (messages to send, and whether to close) and the caller turns that
//! into socket writes.
//!
//! # Login sequence
//!
//! ```text
//! client                    session                       database
//!   │ #handshake!             │                              │
//!   │────────────────────────▶│ gateway lookup, claim name   │
//!   │                         │─── GetCharacterRecord ──────▶│
//!   │                         │◀── CharacterRecord ──────────│
//!   │◀──────── SEND_NOTICE ───│ bind player → WaitingConfirm │
//!   │ CONFIRM_NOTICE          │                              │
//!   │────────────────────────▶│─── seven loads + community ─▶│ → WaitingDbInfo
//!   │                         │◀── responses, any order ─────│
//!   │◀──── LOGON, ABILITY, …──│ gate opens → Verified        │
//! ```
//!
//! All input for one session runs on one task, so the methods take
//! `&mut self`; the atomics inside [`LoadGate`] keep world entry
//! single-shot even so.

use std::fmt;
use std::sync::{Arc, LazyLock};

use hearthgate_protocol::command::client;
use hearthgate_protocol::{
    BinaryMessageCodec, DecodedMessage, Frame, FrameCodec, FrameReassembler, LoginDescriptor,
    VerificationCodec, FRAME_START,
};
use tracing::{debug, info, warn};

use crate::compat::{legacy_confirm, LegacyInput};
use crate::gate::{LoadGate, Mark};
use crate::{
    outbound, ClientKey, CommandDispatcher, Container, DbBody, DbCorrelator, DbFailure, DbRequest,
    DbResponse, LoadFlag, LoadedCharacter, PendingLogin, Services, SessionConfig, SessionState,
};

static DISPATCHER: LazyLock<CommandDispatcher> = LazyLock::new(CommandDispatcher::new);

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why the session asked to be closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent `QUIT`.
    Quit,
    /// The gateway had no pending login for the handshake.
    UnknownLogin,
    /// The character is already in play on another session.
    DuplicateLogin,
    /// The character record lookup failed.
    CharacterUnavailable,
    /// A load the player cannot play without failed.
    CriticalLoadFailed(LoadFlag),
    /// The server closed the session.
    Kicked(String),
}

impl DisconnectReason {
    /// Text shown to the player before the connection closes.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Quit => None,
            Self::UnknownLogin => Some("Your login has expired. Please log in again."),
            Self::DuplicateLogin => Some("This character is already logged in."),
            Self::CharacterUnavailable => Some("Your character could not be loaded."),
            Self::CriticalLoadFailed(_) => Some("Failed to load your items. Please reconnect."),
            Self::Kicked(reason) => Some(reason),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "client quit"),
            Self::UnknownLogin => write!(f, "unknown login"),
            Self::DuplicateLogin => write!(f, "duplicate login"),
            Self::CharacterUnavailable => write!(f, "character unavailable"),
            Self::CriticalLoadFailed(flag) => write!(f, "{flag} load failed"),
            Self::Kicked(reason) => write!(f, "kicked: {reason}"),
        }
    }
}

/// What the caller should do after feeding the session one input.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Messages to send to the client, in order.
    pub outgoing: Vec<DecodedMessage>,
    /// Close the connection after sending `outgoing`.
    pub disconnect: Option<DisconnectReason>,
}

impl Outcome {
    fn send(&mut self, msg: DecodedMessage) {
        self.outgoing.push(msg);
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.disconnect.is_none()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Who a session is playing, once the character record has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPlayer {
    pub login_id: u32,
    pub account: String,
    pub char_name: String,
    pub char_id: u32,
}

/// A handshake that passed the gateway and is waiting for its record.
#[derive(Debug)]
struct AwaitingRecord {
    descriptor: LoginDescriptor,
    login: PendingLogin,
}

/// One client's login and play state.
pub struct Session {
    key: ClientKey,
    state: SessionState,
    services: Services,
    config: Arc<SessionConfig>,
    pre_auth: FrameReassembler,
    post_auth: FrameReassembler,
    awaiting_record: Option<AwaitingRecord>,
    /// Registry name held by this session, bound or not.
    claimed_name: Option<String>,
    player: Option<BoundPlayer>,
    loaded: LoadedCharacter,
    gate: LoadGate,
    closing: bool,
    torn_down: bool,
}

impl Session {
    pub fn new(key: ClientKey, services: Services, config: Arc<SessionConfig>) -> Self {
        Self {
            key,
            state: SessionState::NotVerified,
            pre_auth: FrameReassembler::new(config.pre_auth_buffer_cap),
            post_auth: FrameReassembler::new(config.post_auth_buffer_cap),
            services,
            config,
            awaiting_record: None,
            claimed_name: None,
            player: None,
            loaded: LoadedCharacter::default(),
            gate: LoadGate::new(),
            closing: false,
            torn_down: false,
        }
    }

    pub fn key(&self) -> ClientKey {
        self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The bound player, once the character record has been accepted.
    pub fn player(&self) -> Option<&BoundPlayer> {
        self.player.as_ref()
    }

    /// Character data collected so far.
    pub fn loaded(&self) -> &LoadedCharacter {
        &self.loaded
    }

    pub fn load_gate(&self) -> &LoadGate {
        &self.gate
    }

    /// `true` once a disconnect has been requested or teardown has run.
    /// A closed session ignores all further input.
    pub fn is_closed(&self) -> bool {
        self.closing || self.torn_down
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Feeds bytes read from the client socket.
    pub fn on_bytes(&mut self, data: &[u8]) -> Outcome {
        let mut out = Outcome::default();
        if self.is_closed() || data.is_empty() {
            return out;
        }
        if self.state.is_pre_auth() {
            self.on_handshake_bytes(data, &mut out);
        } else {
            self.on_message_bytes(data, &mut out);
        }
        out
    }

    /// Applies a response from the database link.
    ///
    /// Responses carrying another session's key are dropped.
    pub fn on_db_response(&mut self, response: DbResponse) -> Outcome {
        let mut out = Outcome::default();
        if self.is_closed() || !DbCorrelator::is_for_session(&response, self.key) {
            return out;
        }

        match response.body {
            DbBody::CharacterRecord(result) => self.on_character_record(result, &mut out),
            DbBody::Items { container, result } => {
                self.on_load(container.load_flag(), result, &mut out, |loaded, items| {
                    match container {
                        Container::Bag => loaded.bag = items,
                        Container::Equipment => loaded.equipment = items,
                        Container::Bank => loaded.bank = items,
                    }
                });
            }
            DbBody::Magic(result) => {
                self.on_load(LoadFlag::Magic, result, &mut out, |l, v| l.magic = v);
            }
            DbBody::TaskInfo(result) => {
                self.on_load(LoadFlag::TaskInfo, result, &mut out, |l, v| l.tasks = v);
            }
            DbBody::UpgradeItems(result) => {
                self.on_load(LoadFlag::UpgradeItem, result, &mut out, |l, v| l.upgrade_items = v);
            }
            DbBody::PetBank(result) => {
                self.on_load(LoadFlag::PetBank, result, &mut out, |l, v| l.pet_bank = v);
            }
            DbBody::Community(result) => self.on_community(result),
            DbBody::Saved(Ok(())) => debug!(client_key = %self.key, "Character saved"),
            DbBody::Saved(Err(e)) => {
                warn!(client_key = %self.key, error = %e, "Character save failed");
            }
        }
        out
    }

    /// Delivers a message another server forwarded for this player.
    ///
    /// Only verified sessions receive forwarded traffic, and only when
    /// the message carries this session's key.
    pub fn on_forwarded(&mut self, msg: DecodedMessage) -> Outcome {
        let mut out = Outcome::default();
        if self.is_closed() || !DbCorrelator::is_forwarded_for(&msg, self.key) {
            return out;
        }
        if self.state != SessionState::Verified {
            debug!(client_key = %self.key, state = %self.state, "Forwarded message before world entry dropped");
            return out;
        }
        out.send(msg);
        out
    }

    /// Closes the session on the server's initiative.
    pub fn kick(&mut self, reason: &str) -> Outcome {
        let mut out = Outcome::default();
        if !self.is_closed() {
            self.close(&mut out, DisconnectReason::Kicked(reason.to_string()));
        }
        out
    }

    /// Releases everything the session holds. Safe to call more than
    /// once; returns `true` only for the call that did the work.
    pub fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;

        if self.gate.has_opened() {
            self.services.gameplay.leave_world(self.key);
        }
        if let Some(name) = self.claimed_name.take() {
            self.services.registry.release(&name, self.key);
        }

        info!(
            client_key = %self.key,
            state = %self.state,
            char_name = self.player.as_ref().map(|p| p.char_name.as_str()),
            "Session torn down"
        );
        true
    }

    // -----------------------------------------------------------------------
    // NotVerified
    // -----------------------------------------------------------------------

    fn on_handshake_bytes(&mut self, data: &[u8], out: &mut Outcome) {
        let frames = self.pre_auth.feed(data);
        if frames.is_empty() {
            return;
        }
        if self.awaiting_record.is_some() {
            debug!(client_key = %self.key, frames = frames.len(), "Handshake already accepted; frames ignored");
            return;
        }

        let candidates: Vec<LoginDescriptor> = frames
            .iter()
            .filter_map(|frame| match VerificationCodec.decode(frame) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    debug!(client_key = %self.key, error = %e, "Dropping undecodable handshake frame");
                    None
                }
            })
            .collect();

        let Some((descriptor, login)) = self.choose_candidate(candidates) else {
            return;
        };

        let Some(login) = login else {
            info!(client_key = %self.key, login_id = descriptor.login_id, "No pending login for handshake");
            self.close(out, DisconnectReason::UnknownLogin);
            return;
        };

        if !login.char_name.eq_ignore_ascii_case(&descriptor.char_name) {
            warn!(
                client_key = %self.key,
                requested = %descriptor.char_name,
                issued = %login.char_name,
                "Handshake names a different character than the gateway issued"
            );
        }

        if let Err(e) = self.services.registry.try_claim(&login.char_name, self.key) {
            info!(client_key = %self.key, error = %e, "Login rejected");
            self.close(out, DisconnectReason::DuplicateLogin);
            return;
        }
        self.claimed_name = Some(login.char_name.clone());

        self.services.database.submit(DbRequest::GetCharacterRecord {
            account: login.account.clone(),
            server: self.services.world.server_name(),
            char_name: login.char_name.clone(),
            client_key: self.key,
        });
        info!(
            client_key = %self.key,
            login_id = descriptor.login_id,
            char_name = %login.char_name,
            new_format = descriptor.is_new_format,
            "Handshake accepted; character record requested"
        );
        self.awaiting_record = Some(AwaitingRecord { descriptor, login });
    }

    /// Picks the descriptor to act on from one batch.
    ///
    /// The most recent candidate the gateway knows wins; if it knows none
    /// of them, the most recent candidate is returned without a login.
    fn choose_candidate(
        &self,
        candidates: Vec<LoginDescriptor>,
    ) -> Option<(LoginDescriptor, Option<PendingLogin>)> {
        let mut fallback = None;
        for descriptor in candidates.into_iter().rev() {
            match self.services.gateway.lookup_pending_login(descriptor.login_id) {
                Some(login) => return Some((descriptor, Some(login))),
                None if fallback.is_none() => fallback = Some(descriptor),
                None => {}
            }
        }
        fallback.map(|descriptor| (descriptor, None))
    }

    fn on_character_record(
        &mut self,
        result: Result<crate::CharacterRecord, DbFailure>,
        out: &mut Outcome,
    ) {
        let Some(AwaitingRecord { descriptor, login }) = self.awaiting_record.take() else {
            debug!(client_key = %self.key, state = %self.state, "Unsolicited character record dropped");
            return;
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(client_key = %self.key, char_name = %login.char_name, error = %e, "Character record lookup failed");
                self.close(out, DisconnectReason::CharacterUnavailable);
                return;
            }
        };

        self.services.gateway.consume_pending_login(descriptor.login_id);
        self.player = Some(BoundPlayer {
            login_id: descriptor.login_id,
            account: login.account,
            char_name: record.name.clone(),
            char_id: record.char_id,
        });
        self.loaded = LoadedCharacter {
            record,
            ..LoadedCharacter::default()
        };
        self.gate.reset();
        self.pre_auth.clear();

        self.advance(SessionState::WaitingConfirm);
        out.send(outbound::notice(&self.config.notice_text));
        info!(client_key = %self.key, char_name = %login.char_name, "Player bound; notice sent");
    }

    // -----------------------------------------------------------------------
    // WaitingConfirm / WaitingDbInfo / Verified
    // -----------------------------------------------------------------------

    fn on_message_bytes(&mut self, data: &[u8], out: &mut Outcome) {
        let frames = self.post_auth.feed(data);

        if frames.is_empty() {
            // Old clients sometimes answer the notice with bare text, which
            // may arrive over several reads. A `!` in the text empties the
            // pending buffer, leaving only this chunk to look at.
            let pending = self.post_auth.pending();
            let unframed = if pending.is_empty() { data } else { pending };
            if self.state == SessionState::WaitingConfirm && !unframed.contains(&FRAME_START) {
                if let Some(how) = legacy_confirm(LegacyInput::Unframed(unframed)) {
                    debug!(client_key = %self.key, ?how, "Unframed input taken as confirmation");
                    self.post_auth.clear();
                    self.confirm();
                }
            }
            return;
        }

        for frame in &frames {
            if self.is_closed() {
                break;
            }
            self.on_frame(frame, out);
        }
    }

    fn on_frame(&mut self, frame: &Frame, out: &mut Outcome) {
        let decoded = BinaryMessageCodec.decode(frame);
        match self.state {
            SessionState::WaitingConfirm => match decoded {
                Ok(msg) if msg.command == client::CONFIRM_NOTICE => self.confirm(),
                Ok(msg) if msg.command == client::PING => out.send(outbound::pong(&msg)),
                Ok(msg) => {
                    debug!(client_key = %self.key, command = msg.command, "Ignored while waiting for confirmation");
                }
                Err(error) => {
                    if let Some(how) = legacy_confirm(LegacyInput::Frame { frame, error: &error }) {
                        debug!(client_key = %self.key, ?how, "Frame taken as confirmation");
                        self.confirm();
                    }
                }
            },
            SessionState::WaitingDbInfo => match decoded {
                Ok(msg) if msg.command == client::PING => out.send(outbound::pong(&msg)),
                Ok(msg) => {
                    debug!(client_key = %self.key, command = msg.command, "Ignored while loading");
                }
                Err(e) => debug!(client_key = %self.key, error = %e, "Dropping undecodable frame"),
            },
            SessionState::Verified => match decoded {
                Ok(msg) => {
                    let dispatched =
                        DISPATCHER.dispatch(&msg, self.key, self.services.gameplay.as_ref());
                    out.outgoing.extend(dispatched.replies);
                    if dispatched.quit {
                        self.close(out, DisconnectReason::Quit);
                    }
                }
                Err(e) => debug!(client_key = %self.key, error = %e, "Dropping undecodable frame"),
            },
            SessionState::NotVerified => {
                debug!(client_key = %self.key, "Binary frame before handshake dropped");
            }
        }
    }

    fn confirm(&mut self) {
        self.advance(SessionState::WaitingDbInfo);
        for request in DbRequest::login_batch(self.key) {
            self.services.database.submit(request);
        }
        info!(client_key = %self.key, "Notice confirmed; loading character");
    }

    // -----------------------------------------------------------------------
    // Loads and world entry
    // -----------------------------------------------------------------------

    fn on_load<T: Default>(
        &mut self,
        flag: LoadFlag,
        result: Result<T, DbFailure>,
        out: &mut Outcome,
        apply: impl FnOnce(&mut LoadedCharacter, T),
    ) {
        if self.state != SessionState::WaitingDbInfo {
            debug!(client_key = %self.key, state = %self.state, %flag, "Load response outside loading dropped");
            return;
        }
        if self.gate.flags().is_set(flag) {
            debug!(client_key = %self.key, %flag, "Duplicate load response dropped");
            return;
        }

        let value = match result {
            Ok(value) => value,
            Err(e) if flag.is_critical() => {
                warn!(client_key = %self.key, %flag, error = %e, "Critical load failed");
                self.close(out, DisconnectReason::CriticalLoadFailed(flag));
                return;
            }
            Err(e) => {
                warn!(client_key = %self.key, %flag, error = %e, "Load failed; continuing with defaults");
                T::default()
            }
        };
        apply(&mut self.loaded, value);

        if self.gate.mark(flag) == Mark::Complete {
            self.enter_world(out);
        }
    }

    fn on_community(&mut self, result: Result<crate::CommunityInfo, DbFailure>) {
        if self.state < SessionState::WaitingDbInfo {
            debug!(client_key = %self.key, state = %self.state, "Community response before loading dropped");
            return;
        }
        match result {
            Ok(community) => self.loaded.community = community,
            Err(e) => warn!(client_key = %self.key, error = %e, "Community load failed"),
        }
    }

    fn enter_world(&mut self, out: &mut Outcome) {
        let Some(char_id) = self.player.as_ref().map(|p| p.char_id) else {
            warn!(client_key = %self.key, "Load gate opened without a bound player");
            return;
        };
        let key = self.key;
        let first_login = self.loaded.record.first_login;
        if first_login {
            self.apply_first_login_grant();
        }

        let spawn = self.services.world.spawn_point(&self.loaded.record);
        out.send(outbound::logon(char_id, &spawn));

        let gameplay = Arc::clone(&self.services.gameplay);
        gameplay.enter_world(key, &self.loaded, &spawn);
        out.send(outbound::ability(&gameplay.recompute_abilities(key)));
        let status = gameplay.status(key);
        out.send(outbound::feature(char_id, &status));
        out.send(outbound::weight(&status));

        if first_login {
            out.send(outbound::sys_message("Welcome, adventurer."));
            self.services.database.submit(DbRequest::SaveCharacter {
                client_key: key,
                record: self.loaded.record.clone(),
                bag: self.loaded.bag.clone(),
            });
        }

        self.advance(SessionState::Verified);
        info!(client_key = %key, char_id, first_login, map = %spawn.map, "Entered world");
    }

    fn apply_first_login_grant(&mut self) {
        let world = &self.services.world;
        let record = &mut self.loaded.record;
        let grant = world.first_login_grant(record.job);
        let stats = world.starting_stats(record.job);

        record.level = record.level.max(grant.level);
        record.gold = record.gold.saturating_add(grant.gold);
        record.hp = stats.hp;
        record.mp = stats.mp;
        record.first_login = false;
        self.loaded.bag.extend(grant.items);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn advance(&mut self, to: SessionState) {
        let from = self.state;
        match self.state.advance_to(to) {
            Ok(()) => debug!(client_key = %self.key, %from, %to, "State changed"),
            Err(e) => warn!(client_key = %self.key, error = %e, "State change refused"),
        }
    }

    fn close(&mut self, out: &mut Outcome, reason: DisconnectReason) {
        if let Some(text) = reason.user_message() {
            out.send(outbound::sys_message(text));
        }
        out.send(outbound::disconnect());
        out.disconnect = Some(reason);
        self.closing = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("player", &self.player)
            .field("closing", &self.closing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGateway, RecordingDatabase, ScriptedGameplay, StaticWorld};
    use crate::PlayerRegistry;

    fn session(gateway: Arc<MemoryGateway>) -> Session {
        let services = Services {
            gateway,
            database: Arc::new(RecordingDatabase::new()),
            world: Arc::new(StaticWorld::default()),
            gameplay: Arc::new(ScriptedGameplay::new()),
            registry: Arc::new(PlayerRegistry::new()),
        };
        Session::new(ClientKey::next(), services, Arc::new(SessionConfig::default()))
    }

    fn descriptor(login_id: u32) -> LoginDescriptor {
        LoginDescriptor {
            login_id,
            char_name: format!("Hero{login_id}"),
            selected_char_id: 0,
            client_version: String::new(),
            is_new_format: false,
        }
    }

    #[test]
    fn test_choose_candidate_prefers_known_login() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.register(1, "acct", "Hero1");
        let session = session(gateway);

        let (chosen, login) = session
            .choose_candidate(vec![descriptor(1), descriptor(2)])
            .unwrap();
        assert_eq!(chosen.login_id, 1);
        assert!(login.is_some());
    }

    #[test]
    fn test_choose_candidate_most_recent_known_wins() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.register(1, "acct", "Hero1");
        gateway.register(2, "acct", "Hero2");
        let session = session(gateway);

        let (chosen, _) = session
            .choose_candidate(vec![descriptor(1), descriptor(2)])
            .unwrap();
        assert_eq!(chosen.login_id, 2);
    }

    #[test]
    fn test_choose_candidate_falls_back_to_most_recent() {
        let session = session(Arc::new(MemoryGateway::new()));
        let (chosen, login) = session
            .choose_candidate(vec![descriptor(1), descriptor(2), descriptor(3)])
            .unwrap();
        assert_eq!(chosen.login_id, 3);
        assert!(login.is_none());
        assert!(session.choose_candidate(Vec::new()).is_none());
    }

    #[test]
    fn test_disconnect_reason_messages() {
        assert_eq!(DisconnectReason::Quit.user_message(), None);
        assert_eq!(DisconnectReason::Kicked("bye".into()).user_message(), Some("bye"));
        assert_eq!(
            DisconnectReason::CriticalLoadFailed(LoadFlag::Bag).to_string(),
            "bag load failed"
        );
    }
}
