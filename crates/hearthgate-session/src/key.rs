//! Client keys: the correlation token between a session and every
//! asynchronous request made on its behalf.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Counter for generating client keys. Starts at 1; 0 is never issued.
static NEXT_CLIENT_KEY: AtomicU32 = AtomicU32::new(1);

/// Process-wide unique id of one connection.
///
/// Embedded in every database request and echoed back in every response,
/// so a response arriving on the database link can be matched to the
/// session that asked for it. Assigned once when the session is built and
/// never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ClientKey(u32);

impl ClientKey {
    /// Issues the next key. Wraps around after `u32::MAX`, skipping 0.
    pub fn next() -> Self {
        loop {
            let raw = NEXT_CLIENT_KEY.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return Self(raw);
            }
        }
    }

    /// Wraps a raw value. Returns `None` for 0.
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Returns the underlying value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K-{}", self.0)
    }
}

impl TryFrom<u32> for ClientKey {
    type Error = &'static str;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or("client key 0 is reserved")
    }
}

impl From<ClientKey> for u32 {
    fn from(key: ClientKey) -> u32 {
        key.0
    }
}
