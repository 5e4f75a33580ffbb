//! Unified error type for Hearthgate.

use std::time::Duration;

use hearthgate_protocol::ProtocolError;
use hearthgate_session::SessionError;
use hearthgate_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HearthgateError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (registry, transitions).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A client stopped reading and a write to it did not finish in time.
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),
}
