//! Error types for the session layer.

use crate::SessionState;

/// Errors that can occur while driving a session.
///
/// Most of these never reach the caller of [`Session`](crate::Session):
/// the state machine turns them into a user-visible message and a
/// disconnect directive. They surface directly from the registry and
/// from state transitions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The character already has a live session.
    #[error("character {0:?} is already logged in")]
    AlreadyConnected(String),

    /// A transition that would move the state machine backwards or skip
    /// a state.
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}
