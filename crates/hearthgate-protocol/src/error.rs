//! Error types for the protocol layer.
//!
//! Decoding has its own enum, [`DecodeError`], because callers branch on
//! the kind: the handshake state treats some decode failures as a
//! (lenient) confirmation, while the in-game state just drops them.

use crate::HEADER_LEN;

/// Why a frame could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A byte outside the six-bit alphabet appeared in an encoded body.
    #[error("byte {0:#04x} is outside the six-bit alphabet")]
    InvalidSymbol(u8),

    /// The decoded body is shorter than the fixed binary header.
    #[error("message body is {len} bytes, need at least {HEADER_LEN}")]
    TooShort { len: usize },

    /// The handshake text has neither of the two accepted shapes.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(String),
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Decoding an inbound frame failed.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// A value cannot be represented on the wire.
    ///
    /// For example a character name containing the `/` field separator.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
