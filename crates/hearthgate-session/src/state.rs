//! The session lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Where a connection is in the login sequence.
///
/// Transitions are strictly ordered, one step at a time:
///
/// ```text
/// NotVerified → WaitingConfirm → WaitingDbInfo → Verified
/// ```
///
/// - **NotVerified**: socket accepted; waiting for the handshake frame,
///   then for the character record it asked for.
/// - **WaitingConfirm**: player bound, notice dialog sent; waiting for
///   the client to confirm it.
/// - **WaitingDbInfo**: the seven character loads are in flight.
/// - **Verified**: in the world; gameplay commands are dispatched.
///
/// There is no way back short of tearing the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionState {
    NotVerified,
    WaitingConfirm,
    WaitingDbInfo,
    Verified,
}

impl SessionState {
    /// The state after this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::NotVerified => Some(Self::WaitingConfirm),
            Self::WaitingConfirm => Some(Self::WaitingDbInfo),
            Self::WaitingDbInfo => Some(Self::Verified),
            Self::Verified => None,
        }
    }

    /// Returns `true` if `target` is the immediate successor.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Moves to `target`.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] unless `target` is the immediate
    /// successor; the state is left unchanged.
    pub fn advance_to(&mut self, target: Self) -> Result<(), SessionError> {
        if !self.can_transition_to(target) {
            return Err(SessionError::InvalidTransition {
                from: *self,
                to: target,
            });
        }
        *self = target;
        Ok(())
    }

    /// Returns `true` while frames are the pre-auth handshake text.
    pub fn is_pre_auth(self) -> bool {
        matches!(self, Self::NotVerified)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotVerified => write!(f, "NotVerified"),
            Self::WaitingConfirm => write!(f, "WaitingConfirm"),
            Self::WaitingDbInfo => write!(f, "WaitingDbInfo"),
            Self::Verified => write!(f, "Verified"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionState; 4] = [
        SessionState::NotVerified,
        SessionState::WaitingConfirm,
        SessionState::WaitingDbInfo,
        SessionState::Verified,
    ];

    #[test]
    fn test_next_follows_strict_order() {
        assert_eq!(SessionState::NotVerified.next(), Some(SessionState::WaitingConfirm));
        assert_eq!(SessionState::WaitingConfirm.next(), Some(SessionState::WaitingDbInfo));
        assert_eq!(SessionState::WaitingDbInfo.next(), Some(SessionState::Verified));
        assert_eq!(SessionState::Verified.next(), None);
    }

    #[test]
    fn test_advance_to_only_accepts_successor() {
        for from in ALL {
            for to in ALL {
                let mut state = from;
                let result = state.advance_to(to);
                if from.next() == Some(to) {
                    assert!(result.is_ok());
                    assert_eq!(state, to);
                } else {
                    assert!(matches!(result, Err(SessionError::InvalidTransition { .. })));
                    assert_eq!(state, from, "failed transition must not move");
                }
            }
        }
    }

    #[test]
    fn test_order_matches_lifecycle() {
        assert!(SessionState::NotVerified < SessionState::Verified);
        assert!(SessionState::NotVerified.is_pre_auth());
        assert!(!SessionState::WaitingConfirm.is_pre_auth());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::WaitingDbInfo.to_string(), "WaitingDbInfo");
    }
}
