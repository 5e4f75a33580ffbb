//! Which characters are currently in play, and on which session.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::{ClientKey, SessionError};

/// Process-wide map from character name to the session playing it.
///
/// Names compare case-insensitively. A claim is taken before the
/// character record is requested, so two sockets racing with the same
/// character cannot both get through: the check and the insert happen
/// under one lock.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    by_name: Mutex<HashMap<String, ClientKey>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ClientKey>> {
        // A panic while holding the lock cannot leave the map half-updated;
        // every critical section is a single map operation.
        self.by_name.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The session currently playing `name`, if any.
    pub fn find_by_name(&self, name: &str) -> Option<ClientKey> {
        self.lock().get(&normalize(name)).copied()
    }

    /// Claims `name` for `key`.
    ///
    /// Claiming a name the same key already holds succeeds.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if another session holds it.
    pub fn try_claim(&self, name: &str, key: ClientKey) -> Result<(), SessionError> {
        match self.lock().entry(normalize(name)) {
            Entry::Occupied(held) if *held.get() != key => {
                debug!(char_name = name, holder = %held.get(), client_key = %key, "Name already claimed");
                Err(SessionError::AlreadyConnected(name.to_string()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(key);
                info!(char_name = name, client_key = %key, "Character claimed");
                Ok(())
            }
        }
    }

    /// Releases `name` if `key` holds it. Returns `true` if released.
    pub fn release(&self, name: &str, key: ClientKey) -> bool {
        let mut map = self.lock();
        let normalized = normalize(name);
        if map.get(&normalized) == Some(&key) {
            map.remove(&normalized);
            info!(char_name = name, client_key = %key, "Character released");
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
}
