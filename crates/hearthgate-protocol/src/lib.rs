//! Wire protocol for Hearthgate.
//!
//! Everything a client sends or receives travels as a `#`…`!` frame:
//!
//! - **Framing** ([`FrameReassembler`], [`Frame`]): cutting frames out
//!   of a TCP byte stream.
//! - **Transform** ([`sixbit`]): the reversible byte transform applied
//!   to every frame body.
//! - **Codecs** ([`FrameCodec`], [`VerificationCodec`],
//!   [`BinaryMessageCodec`]): the pre-auth handshake text and the
//!   post-auth fixed-header messages.
//! - **Commands** ([`command`]): command code tables.
//!
//! ```text
//! Transport (bytes) → FrameReassembler (Frame) → codec (typed) → Session
//! ```

mod codec;
pub mod command;
mod error;
mod frame;
mod handshake;
mod message;
pub mod sixbit;

pub use codec::FrameCodec;
pub use error::{DecodeError, ProtocolError};
pub use frame::{Frame, FrameReassembler, FRAME_END, FRAME_START};
pub use handshake::{LoginDescriptor, VerificationCodec, NEW_FORMAT_SENTINEL};
pub use message::{BinaryMessageCodec, DecodedMessage, HEADER_LEN};
