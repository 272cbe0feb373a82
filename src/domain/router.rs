//! Broadcast routing policy.
//!
//! [`select_recipients`] is a pure function from a message's targeting and
//! the live session set to the list of connections that should receive it.
//! The hub consults it on every broadcast; it never touches queues itself.
//!
//! Policy, evaluated only for `Verified` sessions:
//!
//! | Targeting          | Selected when                         |
//! |--------------------|---------------------------------------|
//! | `Explicit(ids)`    | session id is in `ids` (flags ignored) |
//! | `Everyone`         | `send_all \|\| !send_none`             |
//! | `SendAllOnly`      | `send_all`                            |

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ConnectionId, IdentityStatus, SessionId};

/// Which sessions a broadcast is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ids", rename_all = "snake_case")]
pub enum Targeting {
    /// Every eligible session; `send_none` sessions opt out unless they
    /// also set `send_all`.
    Everyone,
    /// Only sessions that asked for every broadcast (monitoring/admin).
    SendAllOnly,
    /// Exactly the named sessions, regardless of their flags.
    Explicit(Vec<SessionId>),
}

/// An outbound event submitted to the hub.
///
/// The payload is serialized once and shared by every recipient.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    /// Event kind (e.g. `"vote"`, `"github"`), surfaced to clients.
    pub kind: String,
    /// Routing policy.
    pub targeting: Targeting,
    /// Application payload; opaque to the hub.
    pub payload: Arc<serde_json::Value>,
}

impl BroadcastMessage {
    /// Creates a message with the given kind, targeting and payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, targeting: Targeting, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            targeting,
            payload: Arc::new(payload),
        }
    }
}

/// The routing-relevant view of one registered session.
#[derive(Debug, Clone, Copy)]
pub struct RouteCandidate<'a> {
    /// Registry key.
    pub conn: ConnectionId,
    /// Bound identity, if verified.
    pub id: Option<&'a SessionId>,
    /// Verification stage.
    pub status: IdentityStatus,
    /// Receives every broadcast.
    pub send_all: bool,
    /// Opted out of untargeted broadcasts.
    pub send_none: bool,
}

/// Selects the recipients of a broadcast.
///
/// Candidates are returned in the order they are supplied; the hub supplies
/// them in connection order.
pub fn select_recipients<'a, I>(targeting: &Targeting, candidates: I) -> Vec<ConnectionId>
where
    I: IntoIterator<Item = RouteCandidate<'a>>,
{
    let explicit: Option<HashSet<&SessionId>> = match targeting {
        Targeting::Explicit(ids) => Some(ids.iter().collect()),
        Targeting::Everyone | Targeting::SendAllOnly => None,
    };

    candidates
        .into_iter()
        .filter(|c| c.status == IdentityStatus::Verified)
        .filter(|c| match (&explicit, targeting) {
            (Some(ids), _) => c.id.is_some_and(|id| ids.contains(id)),
            (None, Targeting::SendAllOnly) => c.send_all,
            (None, _) => c.send_all || !c.send_none,
        })
        .map(|c| c.conn)
        .collect()
}
