//! The [`FrameCodec`] trait and the helpers both codecs share.
//!
//! Both protocol phases put a six-bit-encoded body inside a `#`…`!`
//! envelope; they only differ in what the decoded bytes mean. A codec
//! is the strategy that turns one frame into one typed value and back.

use crate::{sixbit, DecodeError, Frame, ProtocolError, FRAME_END, FRAME_START};

/// Converts between a typed value and a wire frame.
///
/// `Send + Sync + 'static` so a codec can live in shared server state and
/// be used from any task.
pub trait FrameCodec: Send + Sync + 'static {
    /// The value carried by one frame.
    type Item;

    /// Encodes `item` into a complete `#`…`!` frame.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] if the value cannot be
    /// represented on the wire.
    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>, ProtocolError>;

    /// Decodes one frame.
    ///
    /// # Errors
    /// A [`DecodeError`] describing why the frame is not a valid item.
    fn decode(&self, frame: &Frame) -> Result<Self::Item, DecodeError>;
}

/// Strips the single leading sequence digit clients put in front of the
/// encoded body. Digits are never six-bit symbols, so this is unambiguous.
pub(crate) fn strip_sequence_digit(body: &[u8]) -> &[u8] {
    match body.first() {
        Some(b) if b.is_ascii_digit() => &body[1..],
        _ => body,
    }
}

/// Six-bit encodes `raw` and wraps it in frame markers.
pub(crate) fn wrap_encoded(raw: &[u8]) -> Vec<u8> {
    let encoded = sixbit::encode(raw);
    let mut out = Vec::with_capacity(encoded.len() + 2);
    out.push(FRAME_START);
    out.extend_from_slice(&encoded);
    out.push(FRAME_END);
    out
}
