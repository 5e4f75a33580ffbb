//! # Hearthgate
//!
//! Front end for a multiplayer game server: accepts client sockets, runs
//! the login handshake, gates world entry on the character loads, and
//! routes database responses back to the session that asked for them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hearthgate::prelude::*;
//!
//! // Provide a `Services` bundle for your gateway, database, world and
//! // gameplay, then:
//! // let server = HearthgateServer::builder()
//! //     .bind("0.0.0.0:7400")
//! //     .build(services)
//! //     .await?;
//! // server.run().await
//! ```

mod error;
mod handler;
mod server;
mod table;

pub use error::HearthgateError;
pub use server::{HearthgateServer, HearthgateServerBuilder, DEFAULT_WRITE_TIMEOUT};
pub use table::{SessionEvent, SessionTable};

/// Everything needed to embed a server, in one import.
pub mod prelude {
    pub use crate::{HearthgateError, HearthgateServer, HearthgateServerBuilder, SessionTable};
    pub use hearthgate_protocol::{DecodedMessage, LoginDescriptor};
    pub use hearthgate_session::memory::{
        MemoryDatabase, MemoryGateway, ScriptedGameplay, StaticWorld, StoredCharacter,
    };
    pub use hearthgate_session::{
        CharacterRecord, ClientKey, DatabaseService, DbRequest, DbResponse, DbResponseSink,
        Gameplay, LoginGateway, PlayerRegistry, Services, SessionConfig, WorldProvider,
    };
}
