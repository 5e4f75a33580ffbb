//! Fixed-header binary messages used after the handshake.
//!
//! ```text
//! ┌──────────────┬─────────┬────────┬────────┬────────┬───────────┐
//! │ correlation  │ command │ param1 │ param2 │ param3 │ payload…  │
//! │ u32 LE       │ u16 LE  │ u16 LE │ u16 LE │ u16 LE │ N bytes   │
//! └──────────────┴─────────┴────────┴────────┴────────┴───────────┘
//!   12-byte header; payload length is whatever the frame leaves over
//! ```
//!
//! Header and payload are six-bit encoded together and wrapped in the
//! same `#`…`!` envelope the handshake uses. Fields are written and read
//! one at a time through `bytes`' `BufMut`/`Buf`, never by reinterpreting
//! a struct's memory.

use std::borrow::Cow;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::codec::{strip_sequence_digit, wrap_encoded};
use crate::{sixbit, DecodeError, Frame, FrameCodec, ProtocolError};

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 12;

/// One binary message: header fields plus an opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// Correlation value. For database and cross-server traffic this is
    /// the owning session's client key; for client traffic it is
    /// whatever the client put there (usually an object id or 0).
    pub correlation: u32,

    /// Command code, see [`crate::command`].
    pub command: u16,

    /// Three command-specific parameters.
    pub params: [u16; 3],

    /// Variable-length payload.
    pub payload: Vec<u8>,
}

impl DecodedMessage {
    /// A message with the given command and all other fields zero.
    pub fn new(command: u16) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    /// Sets the correlation value.
    pub fn with_correlation(mut self, correlation: u32) -> Self {
        self.correlation = correlation;
        self
    }

    /// Sets all three parameters.
    pub fn with_params(mut self, p1: u16, p2: u16, p3: u16) -> Self {
        self.params = [p1, p2, p3];
        self
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets the payload to UTF-8 text.
    pub fn with_text(self, text: &str) -> Self {
        self.with_payload(text.as_bytes())
    }

    /// The payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Serializes header and payload (before the six-bit transform).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.put_u32_le(self.correlation);
        out.put_u16_le(self.command);
        for p in self.params {
            out.put_u16_le(p);
        }
        out.put_slice(&self.payload);
        out
    }

    /// Parses header and payload (after the six-bit transform).
    ///
    /// # Errors
    /// [`DecodeError::TooShort`] if `raw` cannot hold the header.
    pub fn from_bytes(mut raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() < HEADER_LEN {
            return Err(DecodeError::TooShort { len: raw.len() });
        }
        let correlation = raw.get_u32_le();
        let command = raw.get_u16_le();
        let params = [raw.get_u16_le(), raw.get_u16_le(), raw.get_u16_le()];
        Ok(Self {
            correlation,
            command,
            params,
            payload: raw.to_vec(),
        })
    }
}

/// [`FrameCodec`] for post-handshake binary messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryMessageCodec;

impl FrameCodec for BinaryMessageCodec {
    type Item = DecodedMessage;

    fn encode(&self, msg: &DecodedMessage) -> Result<Vec<u8>, ProtocolError> {
        Ok(wrap_encoded(&msg.to_bytes()))
    }

    fn decode(&self, frame: &Frame) -> Result<DecodedMessage, DecodeError> {
        let encoded = strip_sequence_digit(frame.body());
        let raw = sixbit::decode(encoded)?;
        DecodedMessage::from_bytes(&raw)
    }
}

impl BinaryMessageCodec {
    /// Six-bit decodes a frame body without interpreting it.
    ///
    /// Used by the handshake's lenient confirmation rules, which look at
    /// bodies too short to hold a header.
    pub fn decode_raw(&self, frame: &Frame) -> Result<Vec<u8>, DecodeError> {
        sixbit::decode(strip_sequence_digit(frame.body()))
    }
}
