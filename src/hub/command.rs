//! Requests accepted by the hub control loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::domain::{BroadcastMessage, ConnectionId, SessionId, SessionIdentity};
use crate::ws::outbound::OutboundQueue;

/// What the hub keeps of a session: its key and its outbound queue.
///
/// The socket itself stays with the session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Registry key.
    pub conn: ConnectionId,
    /// Queue drained by the session's write loop.
    pub outbound: Arc<OutboundQueue>,
    /// Accept time.
    pub connected_at: DateTime<Utc>,
}

impl SessionHandle {
    /// Creates a handle for a freshly accepted connection.
    #[must_use]
    pub fn new(conn: ConnectionId, outbound: Arc<OutboundQueue>) -> Self {
        Self {
            conn,
            outbound,
            connected_at: Utc::now(),
        }
    }
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// The registry holds `max_connections` sessions.
    #[error("hub at capacity ({max} connections)")]
    AtCapacity {
        /// Configured limit.
        max: usize,
    },
    /// The connection id is already registered.
    #[error("connection already registered")]
    Duplicate,
}

/// Selects the session(s) a flag change applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagTarget {
    /// One physical connection (a session changing its own flags).
    Connection(ConnectionId),
    /// The connection currently bound to a verified id.
    Session(SessionId),
}

/// Eligibility change; `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagUpdate {
    /// New `send_all` value.
    pub send_all: Option<bool>,
    /// New `send_none` value.
    pub send_none: Option<bool>,
}

/// A request processed, in submission order, by the control loop.
#[derive(Debug)]
pub(crate) enum Command {
    Register {
        session: SessionHandle,
        reply: oneshot::Sender<Result<(), RegisterError>>,
    },
    Verify {
        conn: ConnectionId,
        identity: SessionIdentity,
    },
    Unregister {
        conn: ConnectionId,
    },
    SetFlags {
        target: FlagTarget,
        update: FlagUpdate,
    },
    Broadcast {
        message: BroadcastMessage,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}
