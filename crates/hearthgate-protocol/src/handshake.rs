//! The pre-authentication handshake: which login and character a fresh
//! socket belongs to.
//!
//! After connecting, the client sends one text frame naming the login
//! ticket the gateway issued and the character it picked:
//!
//! ```text
//! current:  #<digit?><encoded "***<loginId>/<charName>/<selCharId>/<version>/<trailer>">!
//! legacy:   #<digit?><encoded "<loginId>/<charName>/<selCharId>">!
//! ```
//!
//! Some old clients skip the six-bit transform and send the text as-is.
//! Anything outside the six-bit alphabet (`/`, `*`, digits after the
//! first byte) marks such a body, so those are parsed directly.

use serde::{Deserialize, Serialize};

use crate::codec::{strip_sequence_digit, wrap_encoded};
use crate::{sixbit, DecodeError, Frame, FrameCodec, ProtocolError};

/// Prefix that marks the current (five-field) handshake format.
pub const NEW_FORMAT_SENTINEL: &str = "***";

const FIELD_SEPARATOR: char = '/';

/// The parsed handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginDescriptor {
    /// Ticket id the login gateway issued for this client.
    pub login_id: u32,
    /// Character the client wants to play.
    pub char_name: String,
    /// Character slot/id the client selected.
    pub selected_char_id: u32,
    /// Client build string; empty for the legacy format.
    pub client_version: String,
    /// `true` if the `***` five-field format was used.
    pub is_new_format: bool,
}

impl LoginDescriptor {
    /// Parses decoded handshake text.
    ///
    /// # Errors
    /// [`DecodeError::MalformedHandshake`] for any shape other than three
    /// legacy fields or `***` plus five fields, or for non-numeric ids.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let text = text.trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace());

        let (is_new_format, rest) = match text.strip_prefix(NEW_FORMAT_SENTINEL) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let fields: Vec<&str> = rest.split(FIELD_SEPARATOR).collect();
        let expected = if is_new_format { 5 } else { 3 };
        if fields.len() != expected {
            return Err(DecodeError::MalformedHandshake(format!(
                "expected {expected} fields, got {}",
                fields.len()
            )));
        }

        let login_id = parse_number(fields[0], "login id")?;
        let char_name = fields[1];
        if char_name.is_empty() {
            return Err(DecodeError::MalformedHandshake(
                "empty character name".into(),
            ));
        }
        let selected_char_id = parse_number(fields[2], "selected character id")?;

        let client_version = if is_new_format {
            // The trailer carries no information we use, but a
            // non-numeric one means the text is not a handshake.
            fields[4].parse::<i64>().map_err(|_| {
                DecodeError::MalformedHandshake(format!(
                    "non-numeric trailer {:?}",
                    fields[4]
                ))
            })?;
            fields[3].to_string()
        } else {
            String::new()
        };

        Ok(Self {
            login_id,
            char_name: char_name.to_string(),
            selected_char_id,
            client_version,
            is_new_format,
        })
    }

    /// Renders the descriptor back into handshake text.
    pub fn to_text(&self) -> String {
        if self.is_new_format {
            format!(
                "{NEW_FORMAT_SENTINEL}{}/{}/{}/{}/0",
                self.login_id, self.char_name, self.selected_char_id, self.client_version
            )
        } else {
            format!(
                "{}/{}/{}",
                self.login_id, self.char_name, self.selected_char_id
            )
        }
    }
}

fn parse_number(field: &str, what: &str) -> Result<u32, DecodeError> {
    field.parse().map_err(|_| {
        DecodeError::MalformedHandshake(format!("{what} {field:?} is not a number"))
    })
}

/// [`FrameCodec`] for the handshake frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationCodec;

impl VerificationCodec {
    /// Recovers the handshake text from a frame body.
    ///
    /// Encoded bodies are six-bit decoded after dropping one sequence
    /// digit; bodies with characters outside the alphabet are taken as
    /// plain text.
    pub fn decode_text(&self, frame: &Frame) -> Result<String, DecodeError> {
        let body = frame.body();
        let encoded = strip_sequence_digit(body);

        let bytes = if !encoded.is_empty() && encoded.iter().all(|&b| sixbit::is_symbol(b)) {
            sixbit::decode(encoded)?
        } else {
            body.to_vec()
        };

        String::from_utf8(bytes).map_err(|_| {
            DecodeError::MalformedHandshake("handshake text is not UTF-8".into())
        })
    }
}

impl FrameCodec for VerificationCodec {
    type Item = LoginDescriptor;

    fn encode(&self, desc: &LoginDescriptor) -> Result<Vec<u8>, ProtocolError> {
        if desc.char_name.is_empty() || desc.char_name.contains(FIELD_SEPARATOR) {
            return Err(ProtocolError::InvalidMessage(format!(
                "character name {:?} cannot be sent in a handshake",
                desc.char_name
            )));
        }
        if desc.client_version.contains(FIELD_SEPARATOR) {
            return Err(ProtocolError::InvalidMessage(format!(
                "client version {:?} contains a field separator",
                desc.client_version
            )));
        }
        Ok(wrap_encoded(desc.to_text().as_bytes()))
    }

    fn decode(&self, frame: &Frame) -> Result<LoginDescriptor, DecodeError> {
        LoginDescriptor::parse(&self.decode_text(frame)?)
    }
}
