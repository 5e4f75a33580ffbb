//! Per-connection session logic for Hearthgate.
//!
//! This crate is everything between "bytes arrived" and "the player is
//! standing in the world":
//!
//! 1. **State machine** ([`Session`], [`SessionState`]): the login
//!    sequence and, once verified, command routing.
//! 2. **Correlation** ([`ClientKey`], [`DbCorrelator`]): matching
//!    asynchronous database responses to the session that asked.
//! 3. **Load gate** ([`LoadGate`]): world entry exactly once, after all
//!    seven character loads.
//! 4. **Collaborators** ([`Services`]): gateway, database, world,
//!    gameplay, and the [`PlayerRegistry`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Server layer (above)   ← owns sockets, routes database responses here
//!     ↕
//! Session layer (this crate)  ← decides what every input means
//!     ↕
//! Protocol layer (below) ← frames, codecs, DecodedMessage
//! ```
//!
//! Nothing here does I/O. Every input returns an [`Outcome`] describing
//! what to send and whether to close.

mod compat;
mod config;
mod correlate;
mod db;
mod dispatch;
mod error;
mod gate;
mod key;
pub mod memory;
mod outbound;
mod registry;
mod services;
mod session;
mod state;

pub use compat::{legacy_confirm, LegacyConfirm, LegacyInput, CONFIRM_KEYWORDS};
pub use config::SessionConfig;
pub use correlate::DbCorrelator;
pub use db::{
    CharacterRecord, CommunityInfo, Container, DbBody, DbFailure, DbRequest, DbResponse,
    ItemRecord, KeyPlacement, MagicRecord, TaskRecord,
};
pub use dispatch::{CommandDispatcher, Dispatched};
pub use error::SessionError;
pub use gate::{LoadFlag, LoadFlags, LoadGate, Mark};
pub use key::ClientKey;
pub use registry::PlayerRegistry;
pub use services::{
    Abilities, DatabaseService, DbResponseSink, FirstLoginGrant, Gameplay, LoadedCharacter,
    LoginGateway, PendingLogin, PlayerAction, Services, SpawnPoint, StartingStats,
    StatusSnapshot, WorldProvider,
};
pub use session::{BoundPlayer, DisconnectReason, Outcome, Session};
pub use state::SessionState;
