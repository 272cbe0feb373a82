//! Per-connection lifecycle state machine.
//!
//! ```text
//! Connecting ─▶ AwaitingIdentity ─┬─▶ Verified ─┐
//!                    │            └─▶ Rejected ─┼─▶ Closing ─▶ Closed
//!                    └──────────────────────────┘
//! ```

use std::fmt;

use crate::domain::IdentityStatus;

/// Lifecycle stage of a [`super::session::ClientSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, not yet admitted by the hub.
    Connecting,
    /// Admitted; waiting for the handshake frame.
    AwaitingIdentity,
    /// Handshake accepted; eligible for broadcasts.
    Verified,
    /// Handshake refused or timed out.
    Rejected,
    /// Loops are shutting down.
    Closing,
    /// Socket closed and hub entry removed.
    Closed,
}

impl SessionState {
    /// Returns `true` if `self → next` is a legal transition.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, AwaitingIdentity)
                | (Connecting, Closing)
                | (AwaitingIdentity, Verified)
                | (AwaitingIdentity, Rejected)
                | (AwaitingIdentity, Closing)
                | (Verified, Closing)
                | (Rejected, Closing)
                | (Closing, Closed)
        )
    }

    /// Identity status implied by this stage.
    #[must_use]
    pub const fn identity_status(self) -> IdentityStatus {
        match self {
            Self::Verified => IdentityStatus::Verified,
            Self::Rejected => IdentityStatus::Rejected,
            _ => IdentityStatus::Pending,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::AwaitingIdentity => "awaiting_identity",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Attempted an illegal lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct InvalidTransition {
    /// Stage before the attempt.
    pub from: SessionState,
    /// Requested stage.
    pub to: SessionState,
}

/// Holder that only permits legal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: SessionState,
}

impl Lifecycle {
    /// Starts in [`SessionState::Connecting`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Connecting,
        }
    }

    /// Current stage.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the stage unchanged when the
    /// transition is not allowed.
    pub fn advance(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if self.state.can_become(next) {
            self.state = next;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    /// Moves to `Closing` (if not already there) and then `Closed`.
    pub fn finish(&mut self) {
        if self.state != SessionState::Closing {
            let _ = self.advance(SessionState::Closing);
        }
        let _ = self.advance(SessionState::Closed);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
