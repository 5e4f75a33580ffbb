//! Matching asynchronous responses to the session that asked for them.

use hearthgate_protocol::DecodedMessage;
use tracing::debug;

use crate::{ClientKey, DbResponse};

/// Checks the client key embedded in inbound traffic.
///
/// A session only ever applies database responses and forwarded
/// messages that carry its own key. Anything else is stale (the key's
/// session is gone and a new one got routed the tail of a conversation)
/// or misrouted, and is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbCorrelator;

impl DbCorrelator {
    /// Returns `true` if `response` belongs to the session with `key`.
    pub fn is_for_session(response: &DbResponse, key: ClientKey) -> bool {
        let embedded = response.embedded_key();
        let matches = embedded == key.get();
        if !matches {
            debug!(
                client_key = %key,
                embedded,
                kind = response.body.kind(),
                "Dropping database response for another session"
            );
        }
        matches
    }

    /// Returns `true` if a cross-server message belongs to `key`.
    /// Forwarded messages always use the correlation field.
    pub fn is_forwarded_for(message: &DecodedMessage, key: ClientKey) -> bool {
        let matches = message.correlation == key.get();
        if !matches {
            debug!(
                client_key = %key,
                embedded = message.correlation,
                command = message.command,
                "Dropping forwarded message for another session"
            );
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Container, DbBody};

    fn key(raw: u32) -> ClientKey {
        ClientKey::from_raw(raw).unwrap()
    }

    #[test]
    fn test_is_for_session_matches_by_shape() {
        let bodies = [
            DbBody::CharacterRecord(Ok(Default::default())),
            DbBody::Items { container: Container::Bag, result: Ok(vec![]) },
            DbBody::Magic(Ok(vec![])),
            DbBody::TaskInfo(Ok(vec![])),
            DbBody::UpgradeItems(Ok(vec![])),
            DbBody::PetBank(Ok(vec![])),
            DbBody::Community(Ok(Default::default())),
        ];
        for body in bodies {
            let resp = DbResponse::new(key(0x0002_0001), body);
            assert!(DbCorrelator::is_for_session(&resp, key(0x0002_0001)));
            assert!(!DbCorrelator::is_for_session(&resp, key(0x0001_0002)));
        }
    }

    #[test]
    fn test_is_for_session_rejects_key_in_wrong_slot() {
        // Magic carries its key in the params; a correlation-only header
        // must not match.
        let mut resp = DbResponse::new(key(9), DbBody::Magic(Ok(vec![])));
        resp.header = DecodedMessage::default().with_correlation(9);
        assert!(!DbCorrelator::is_for_session(&resp, key(9)));
    }

    #[test]
    fn test_is_forwarded_for() {
        let msg = DecodedMessage::new(100).with_correlation(4);
        assert!(DbCorrelator::is_forwarded_for(&msg, key(4)));
        assert!(!DbCorrelator::is_forwarded_for(&msg, key(5)));
    }
}
