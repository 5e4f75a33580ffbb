//! Lenient notice confirmation for old clients.
//!
//! Current clients answer the notice dialog with a well-formed
//! `CONFIRM_NOTICE` message. Older builds do all sorts of things instead:
//! send the bare two-byte command code, type a word, or send a frame the
//! binary codec cannot read. All of that is accepted here, and only
//! here, while the session waits for the confirmation.

use hearthgate_protocol::command::client::CONFIRM_NOTICE;
use hearthgate_protocol::{BinaryMessageCodec, DecodeError, Frame, FRAME_START};

/// Words that count as confirming when they appear as whole tokens.
pub const CONFIRM_KEYWORDS: &[&str] = &["ok", "okay", "yes", "confirm", "confirmed", "accept", "agree"];

/// Why an input was taken as a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyConfirm {
    /// The body was exactly the confirm command code.
    BareCommandCode,
    /// The text contained a confirmation keyword.
    Keyword,
    /// A delimited frame that does not decode as a message.
    UndecodableFrame,
}

/// Input the main decode path could not turn into a confirmation.
#[derive(Debug, Clone, Copy)]
pub enum LegacyInput<'a> {
    /// A frame that failed [`BinaryMessageCodec`] decoding.
    Frame { frame: &'a Frame, error: &'a DecodeError },
    /// Bytes that arrived outside any frame.
    Unframed(&'a [u8]),
}

/// Decides whether `input` counts as the client confirming the notice.
///
/// Delimited frames always confirm: the only frame the client is
/// expected to send at this point is the confirmation, so whatever it
/// managed to frame is taken as one. Unframed bytes confirm only when
/// they are the bare code or contain a keyword, and never while they
/// might be the start of a frame.
pub fn legacy_confirm(input: LegacyInput<'_>) -> Option<LegacyConfirm> {
    match input {
        LegacyInput::Frame { frame, error } => {
            let raw = BinaryMessageCodec.decode_raw(frame).ok();
            if raw.as_deref().is_some_and(is_bare_code) || is_bare_code(frame.body()) {
                return Some(LegacyConfirm::BareCommandCode);
            }
            let decoded_text = raw.as_deref().is_some_and(has_keyword);
            if decoded_text || has_keyword(frame.body()) {
                return Some(LegacyConfirm::Keyword);
            }
            tracing::debug!(error = %error, "Undecodable frame taken as confirmation");
            Some(LegacyConfirm::UndecodableFrame)
        }
        LegacyInput::Unframed(bytes) => {
            if bytes.contains(&FRAME_START) {
                return None;
            }
            if is_bare_code(bytes) {
                return Some(LegacyConfirm::BareCommandCode);
            }
            has_keyword(bytes).then_some(LegacyConfirm::Keyword)
        }
    }
}

/// The two little-endian bytes of the code, or the code as decimal text.
fn is_bare_code(bytes: &[u8]) -> bool {
    if bytes == CONFIRM_NOTICE.to_le_bytes() {
        return true;
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse::<u16>().ok())
        == Some(CONFIRM_NOTICE)
}

fn has_keyword(bytes: &[u8]) -> bool {
    String::from_utf8_lossy(bytes)
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| {
            CONFIRM_KEYWORDS
                .iter()
                .any(|keyword| token.eq_ignore_ascii_case(keyword))
        })
}
