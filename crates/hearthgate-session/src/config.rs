//! Session configuration.

use serde::{Deserialize, Serialize};

/// Tunables for every session on a server.
///
/// Hosts usually load this from their own config file; `#[serde(default)]`
/// lets them specify only the fields they want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum pending bytes while waiting for the handshake frame.
    pub pre_auth_buffer_cap: usize,

    /// Maximum pending bytes once the binary protocol is in use.
    pub post_auth_buffer_cap: usize,

    /// Text of the notice dialog the client must confirm.
    pub notice_text: String,

    /// Capacity of each session's inbound event channel (database
    /// responses, forwarded messages, kicks).
    pub event_channel_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pre_auth_buffer_cap: 1024,
            post_auth_buffer_cap: 16 * 1024,
            notice_text: "Welcome.".to_string(),
            event_channel_size: 64,
        }
    }
}
