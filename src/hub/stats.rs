//! Diagnostic snapshots of the hub.
//!
//! The control loop publishes a fresh [`HubSnapshot`] through a `watch`
//! channel whenever membership or flags change, so readers never contend
//! with the loop. Monotonic counters live in [`HubCounters`] and are bumped
//! from any context with relaxed atomics.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::identity::REDACTED;
use crate::domain::{ConnectionId, IdentityStatus, Role, SessionId};

/// Diagnostic view of one registered session. Never carries a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Registry key.
    pub conn: ConnectionId,
    /// Bound identity, `None` while pending.
    pub id: Option<SessionId>,
    /// Verification stage.
    pub status: IdentityStatus,
    /// Role, known once verified.
    pub role: Option<Role>,
    /// Rate-limit channel, known once verified.
    pub channel: Option<String>,
    /// Receives every broadcast.
    pub send_all: bool,
    /// Opted out of untargeted broadcasts.
    pub send_none: bool,
    /// Write loop alive.
    pub pump_healthy: bool,
    /// Frames waiting in the outbound queue.
    pub queued: usize,
    /// Accept time.
    pub connected_at: DateTime<Utc>,
}

/// Registry snapshot published by the control loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubSnapshot {
    /// Registered sessions in connection order.
    pub sessions: Vec<SessionStats>,
}

impl HubSnapshot {
    /// Number of registered sessions (pending and verified).
    #[must_use]
    pub fn live(&self) -> usize {
        self.sessions.len()
    }

    /// Returns the entry bound to `id`, if any.
    #[must_use]
    pub fn find(&self, id: &SessionId) -> Option<&SessionStats> {
        self.sessions.iter().find(|s| s.id.as_ref() == Some(id))
    }
}

/// Monotonic counters shared between the control loop and sessions.
#[derive(Debug, Default)]
pub struct HubCounters {
    accepted: AtomicU64,
    refused: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    superseded: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    dropped: AtomicU64,
}

/// Which counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Sessions admitted by the hub.
    Accepted,
    /// Sessions refused at capacity.
    Refused,
    /// Handshakes accepted.
    Verified,
    /// Handshakes refused or timed out.
    Rejected,
    /// Sessions replaced by a newer connection with the same id.
    Superseded,
    /// Broadcasts processed.
    Broadcasts,
    /// Frames enqueued for recipients.
    Deliveries,
    /// Event frames dropped on queue overflow.
    Dropped,
}

impl HubCounters {
    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Accepted => &self.accepted,
            Counter::Refused => &self.refused,
            Counter::Verified => &self.verified,
            Counter::Rejected => &self.rejected,
            Counter::Superseded => &self.superseded,
            Counter::Broadcasts => &self.broadcasts,
            Counter::Deliveries => &self.deliveries,
            Counter::Dropped => &self.dropped,
        }
    }

    /// Adds `n` to `counter`.
    pub fn add(&self, counter: Counter, n: u64) {
        self.slot(counter).fetch_add(n, Ordering::Relaxed);
    }

    /// Adds one to `counter`.
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Reads the current values.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let get = |c| self.slot(c).load(Ordering::Relaxed);
        CounterSnapshot {
            accepted: get(Counter::Accepted),
            refused: get(Counter::Refused),
            verified: get(Counter::Verified),
            rejected: get(Counter::Rejected),
            superseded: get(Counter::Superseded),
            broadcasts: get(Counter::Broadcasts),
            deliveries: get(Counter::Deliveries),
            dropped: get(Counter::Dropped),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Sessions admitted.
    pub accepted: u64,
    /// Sessions refused at capacity.
    pub refused: u64,
    /// Handshakes accepted.
    pub verified: u64,
    /// Handshakes refused or timed out.
    pub rejected: u64,
    /// Sessions superseded by a newer connection.
    pub superseded: u64,
    /// Broadcasts processed.
    pub broadcasts: u64,
    /// Frames enqueued for recipients.
    pub deliveries: u64,
    /// Event frames dropped on overflow.
    pub dropped: u64,
}

/// Snapshot plus counters, as returned by [`super::HubHandle::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    /// Registered sessions.
    #[serde(flatten)]
    pub snapshot: HubSnapshot,
    /// Monotonic counters.
    pub counters: CounterSnapshot,
}

impl HubStats {
    /// Plain-text dump served by the diagnostics endpoint.
    ///
    /// The credential line is always the redaction marker.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::from("Websocket server stats:\n\n");
        for (index, s) in self.snapshot.sessions.iter().enumerate() {
            let id = s.id.as_ref().map_or("-", SessionId::as_str);
            let _ = write!(
                out,
                "Client #{index}\nConnection: {}\nID: {id}\nIdentityStatus: {}\nBot: {}\n\
                 RLChannel: {}\nSendAll: {}\nSendNone: {}\nMessagePumpUp: {}\nQueued: {}\n\
                 ConnectedAt: {}\nToken: {REDACTED}\n\n\n",
                s.conn,
                s.status,
                s.role.is_some_and(Role::is_bot),
                s.channel.as_deref().unwrap_or("-"),
                s.send_all,
                s.send_none,
                s.pump_healthy,
                s.queued,
                s.connected_at.to_rfc3339(),
            );
        }
        let c = self.counters;
        let _ = write!(
            out,
            "Totals:\nAccepted: {}\nRefused: {}\nVerified: {}\nRejected: {}\nSuperseded: {}\n\
             Broadcasts: {}\nDeliveries: {}\nDropped: {}\n",
            c.accepted,
            c.refused,
            c.verified,
            c.rejected,
            c.superseded,
            c.broadcasts,
            c.deliveries,
            c.dropped,
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified(conn: u64, id: &str) -> SessionStats {
        SessionStats {
            conn: ConnectionId::new(conn),
            id: Some(SessionId::from(id)),
            status: IdentityStatus::Verified,
            role: Some(Role::Bot),
            channel: Some(format!("bot:{id}")),
            send_all: false,
            send_none: true,
            pump_healthy: true,
            queued: 0,
            connected_at: Utc::now(),
        }
    }

    #[test]
    fn counters_accumulate() {
        let counters = HubCounters::default();
        counters.incr(Counter::Accepted);
        counters.incr(Counter::Accepted);
        counters.add(Counter::Deliveries, 5);
        let snap = counters.snapshot();
        assert_eq!(snap.accepted, 2);
        assert_eq!(snap.deliveries, 5);
        assert_eq!(snap.refused, 0);
    }

    #[test]
    fn text_dump_lists_fields_and_redacts_token() {
        let stats = HubStats {
            snapshot: HubSnapshot {
                sessions: vec![verified(1, "555")],
            },
            counters: CounterSnapshot::default(),
        };
        let text = stats.render_text();
        assert!(text.contains("Client #0"));
        assert!(text.contains("ID: 555"));
        assert!(text.contains("IdentityStatus: verified"));
        assert!(text.contains("Bot: true"));
        assert!(text.contains("RLChannel: bot:555"));
        assert!(text.contains("SendNone: true"));
        assert!(text.contains("MessagePumpUp: true"));
        assert!(text.contains("Token: [redacted]"));
    }

    #[test]
    fn pending_connection_is_an_anonymous_row() {
        let pending = SessionStats {
            id: None,
            status: IdentityStatus::Pending,
            role: None,
            channel: None,
            ..verified(2, "unused")
        };
        let stats = HubStats {
            snapshot: HubSnapshot {
                sessions: vec![pending],
            },
            counters: CounterSnapshot::default(),
        };
        let text = stats.render_text();
        assert!(text.contains("ID: -\n"));
        assert!(text.contains("IdentityStatus: pending"));
        assert!(text.contains("RLChannel: -"));
        assert!(!text.contains("unused"));
    }

    #[test]
    fn find_by_session_id() {
        let snap = HubSnapshot {
            sessions: vec![verified(1, "a"), verified(2, "b")],
        };
        assert_eq!(snap.find(&SessionId::from("b")).map(|s| s.conn.get()), Some(2));
        assert!(snap.find(&SessionId::from("c")).is_none());
        assert_eq!(snap.live(), 2);
    }
}
