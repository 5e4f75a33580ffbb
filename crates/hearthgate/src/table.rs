//! Live sessions by client key.
//!
//! Each connection task registers here on accept and unregisters on
//! exit. Anything that needs to reach a session from outside its task
//! (the database link, another server forwarding a message, an operator
//! kicking a player) goes through the table, which looks the key up and
//! hands the event to the session's channel.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use hearthgate_protocol::DecodedMessage;
use hearthgate_session::{ClientKey, DbResponse, DbResponseSink};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

/// Input for a session task that did not come from its own socket.
#[derive(Debug)]
pub enum SessionEvent {
    Db(DbResponse),
    Forwarded(DecodedMessage),
    Kick(String),
}

#[derive(Debug)]
struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    closing: Arc<AtomicBool>,
    evicted: Arc<Notify>,
}

/// What a connection task gets back from [`SessionTable::register`].
pub(crate) struct Registration {
    pub(crate) key: ClientKey,
    pub(crate) events: mpsc::Receiver<SessionEvent>,
    pub(crate) closing: Arc<AtomicBool>,
    /// Fires when the session fell so far behind that its channel filled.
    pub(crate) evicted: Arc<Notify>,
}

/// Map from [`ClientKey`] to the live session that owns it.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<ClientKey, SessionHandle>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientKey, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocates a key no live session holds and registers a handle for
    /// it.
    pub(crate) fn register(&self, channel_size: usize) -> Registration {
        let (tx, rx) = mpsc::channel(channel_size.max(1));
        let closing = Arc::new(AtomicBool::new(false));
        let evicted = Arc::new(Notify::new());
        let mut sessions = self.lock();
        loop {
            // Only collides after the key space wraps.
            if let Entry::Vacant(slot) = sessions.entry(ClientKey::next()) {
                let key = *slot.key();
                slot.insert(SessionHandle {
                    events: tx,
                    closing: Arc::clone(&closing),
                    evicted: Arc::clone(&evicted),
                });
                return Registration { key, events: rx, closing, evicted };
            }
        }
    }

    pub(crate) fn unregister(&self, key: ClientKey) -> bool {
        self.lock().remove(&key).is_some()
    }

    /// Hands `event` to the session without waiting.
    ///
    /// A session whose channel is full has stopped draining it. It is
    /// marked closing and told to disconnect, so one stalled client
    /// cannot hold up delivery to the others.
    fn try_post(&self, key: ClientKey, event: SessionEvent) -> bool {
        let sessions = self.lock();
        let Some(handle) = sessions.get(&key) else {
            debug!(client_key = %key, "No live session for event");
            return false;
        };
        if handle.closing.load(Ordering::Acquire) {
            debug!(client_key = %key, "Event for a closing session dropped");
            return false;
        }
        match handle.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client_key = %key, "Session event channel full; evicting session");
                handle.closing.store(true, Ordering::Release);
                handle.evicted.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client_key = %key, "Session event channel closed");
                false
            }
        }
    }

    /// Routes a database response to its session by embedded key.
    /// Returns `true` if the session accepted it.
    pub fn route(&self, response: DbResponse) -> bool {
        match ClientKey::from_raw(response.embedded_key()) {
            Some(key) => self.try_post(key, SessionEvent::Db(response)),
            None => {
                debug!(kind = response.body.kind(), "Database response without a client key");
                false
            }
        }
    }

    /// Routes a cross-server message by its correlation key. Returns
    /// `true` if a live session accepted it.
    pub fn forward(&self, msg: DecodedMessage) -> bool {
        match ClientKey::from_raw(msg.correlation) {
            Some(key) => self.try_post(key, SessionEvent::Forwarded(msg)),
            None => false,
        }
    }

    /// Asks the session to close, showing `reason` to the player.
    pub fn kick(&self, key: ClientKey, reason: &str) -> bool {
        self.try_post(key, SessionEvent::Kick(reason.to_string()))
    }

    /// Kicks every live session.
    pub fn kick_all(&self, reason: &str) -> usize {
        self.keys()
            .into_iter()
            .filter(|key| self.kick(*key, reason))
            .count()
    }

    pub fn contains(&self, key: ClientKey) -> bool {
        self.lock().contains_key(&key)
    }

    pub fn keys(&self) -> Vec<ClientKey> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl DbResponseSink for SessionTable {
    fn deliver(&self, response: DbResponse) {
        self.route(response);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hearthgate_session::DbBody;

    use super::*;

    #[test]
    fn test_register_issues_distinct_keys() {
        let table = SessionTable::new();
        let a = table.register(4);
        let b = table.register(4);
        assert_ne!(a.key, b.key);
        assert_eq!(table.len(), 2);
        assert!(table.unregister(a.key));
        assert!(!table.unregister(a.key));
        assert_eq!(table.keys(), vec![b.key]);
    }

    #[test]
    fn test_deliver_routes_by_embedded_key() {
        let table = SessionTable::new();
        let mut a = table.register(4);
        let mut b = table.register(4);

        table.deliver(DbResponse::new(b.key, DbBody::Magic(Ok(vec![]))));

        assert!(a.events.try_recv().is_err());
        assert!(matches!(b.events.try_recv(), Ok(SessionEvent::Db(_))));
    }

    #[test]
    fn test_forward_unknown_key_is_refused() {
        let table = SessionTable::new();
        let _a = table.register(4);
        assert!(!table.forward(DecodedMessage::new(100).with_correlation(0)));
        assert!(!table.forward(DecodedMessage::new(100).with_correlation(u32::MAX)));
    }

    #[test]
    fn test_kick_skips_closing_session() {
        let table = SessionTable::new();
        let mut a = table.register(4);
        assert!(table.kick(a.key, "bye"));
        assert!(matches!(a.events.try_recv(), Ok(SessionEvent::Kick(r)) if r == "bye"));

        a.closing.store(true, Ordering::Release);
        assert!(!table.kick(a.key, "again"));
    }

    #[test]
    fn test_full_channel_drops_event_and_marks_closing() {
        let table = SessionTable::new();
        let a = table.register(1);
        assert!(table.kick(a.key, "one"));
        assert!(!table.kick(a.key, "two"));
        assert!(a.closing.load(Ordering::Acquire));
        assert!(!table.route(DbResponse::new(a.key, DbBody::Magic(Ok(vec![])))));
    }

    #[tokio::test]
    async fn test_full_channel_wakes_evicted_session() {
        let table = SessionTable::new();
        let a = table.register(1);
        table.kick(a.key, "fill");
        table.route(DbResponse::new(a.key, DbBody::PetBank(Ok(vec![]))));

        let woke = tokio::time::timeout(Duration::from_millis(500), a.evicted.notified()).await;
        assert!(woke.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_session_does_not_block_others() {
        let table = Arc::new(SessionTable::new());
        let stalled = table.register(1);
        let mut healthy = table.register(4);
        table.kick(stalled.key, "fill");

        let (tx, mut link) = mpsc::unbounded_channel();
        tx.send(DbResponse::new(stalled.key, DbBody::Magic(Ok(vec![])))).unwrap();
        tx.send(DbResponse::new(healthy.key, DbBody::Magic(Ok(vec![])))).unwrap();
        drop(tx);

        let pump_table = Arc::clone(&table);
        let pump = tokio::spawn(async move {
            while let Some(response) = link.recv().await {
                pump_table.route(response);
            }
        });

        let got = tokio::time::timeout(Duration::from_millis(500), healthy.events.recv()).await;
        assert!(matches!(got, Ok(Some(SessionEvent::Db(_)))));
        pump.await.unwrap();
        drop(stalled);
    }
}
