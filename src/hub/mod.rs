//! The connection hub: sole owner of the live-session registry.
//!
//! ```text
//! sessions / REST handlers
//!     │  HubHandle (non-blocking submit)
//!     ▼
//! mpsc command queue ──▶ control loop ──▶ BroadcastRouter
//!                            │
//!                            ├──▶ per-session OutboundQueue (push)
//!                            └──▶ watch<HubSnapshot> (diagnostics)
//! ```

pub mod command;
pub mod control;
pub mod handle;
pub mod stats;

pub use command::{FlagTarget, FlagUpdate, RegisterError, SessionHandle};
pub use control::HubConfig;
pub use handle::HubHandle;
pub use stats::{Counter, CounterSnapshot, HubCounters, HubSnapshot, HubStats, SessionStats};

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::domain::{
        BroadcastMessage, ConnectionId, IdentityStatus, Role, SessionId, SessionIdentity, Targeting,
    };
    use crate::error::GatewayError;
    use crate::ws::messages::WsMessageType;
    use crate::ws::outbound::OutboundQueue;

    struct TestSession {
        conn: ConnectionId,
        queue: Arc<OutboundQueue>,
    }

    impl TestSession {
        /// Drains everything currently queued, parsed as JSON.
        async fn drain(&self) -> Vec<(WsMessageType, serde_json::Value)> {
            let mut out = Vec::new();
            while !self.queue.is_empty() {
                let Some(frame) = self.queue.pop().await else {
                    break;
                };
                let Ok(value) = serde_json::from_str::<serde_json::Value>(frame.text()) else {
                    panic!("frames are JSON");
                };
                let Ok(kind) = serde_json::from_value::<WsMessageType>(value["type"].clone()) else {
                    panic!("frames carry a type");
                };
                out.push((kind, value["payload"].clone()));
            }
            out
        }

        async fn events(&self) -> Vec<serde_json::Value> {
            self.drain()
                .await
                .into_iter()
                .filter(|(kind, _)| *kind == WsMessageType::Event)
                .map(|(_, payload)| payload)
                .collect()
        }
    }

    fn spawn(max_connections: usize) -> HubHandle {
        let (hub, _task) = HubHandle::spawn(
            HubConfig {
                max_connections,
                maintenance_interval: Duration::from_secs(3600),
            },
            None,
        );
        hub
    }

    async fn connect(hub: &HubHandle) -> Result<TestSession, GatewayError> {
        let conn = hub.next_connection_id();
        let queue = Arc::new(OutboundQueue::new(16));
        hub.register(SessionHandle::new(conn, Arc::clone(&queue)))
            .await?;
        Ok(TestSession { conn, queue })
    }

    async fn verified(hub: &HubHandle, id: &str) -> TestSession {
        let Ok(session) = connect(hub).await else {
            panic!("registration failed");
        };
        hub.verify(session.conn, identity(id));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        session
    }

    fn identity(id: &str) -> SessionIdentity {
        SessionIdentity::new(SessionId::from(id), Role::Bot)
    }

    fn message(targeting: Targeting) -> BroadcastMessage {
        BroadcastMessage::new("vote", targeting, serde_json::json!({"votes": 1}))
    }

    #[tokio::test]
    async fn registered_session_starts_pending() {
        let hub = spawn(10);
        let Ok(session) = connect(&hub).await else {
            panic!("registration failed");
        };
        let snap = hub.snapshot();
        assert_eq!(snap.live(), 1);
        let Some(entry) = snap.sessions.first() else {
            panic!("entry missing");
        };
        assert_eq!(entry.conn, session.conn);
        assert_eq!(entry.status, IdentityStatus::Pending);
        assert!(entry.id.is_none());
    }

    #[tokio::test]
    async fn capacity_is_enforced_at_registration() {
        let hub = spawn(2);
        assert!(connect(&hub).await.is_ok());
        assert!(connect(&hub).await.is_ok());
        assert!(matches!(connect(&hub).await, Err(GatewayError::AtCapacity)));
        assert!(hub.is_at_capacity());
        assert_eq!(hub.stats().counters.refused, 1);
    }

    #[tokio::test]
    async fn verify_pushes_ready_frame_and_marks_verified() {
        let hub = spawn(10);
        let session = verified(&hub, "42").await;
        let frames = session.drain().await;
        assert!(matches!(frames.first(), Some((WsMessageType::Ready, p)) if p["id"] == "42"));
        let snap = hub.snapshot();
        let Some(entry) = snap.find(&SessionId::from("42")) else {
            panic!("verified session missing from stats");
        };
        assert_eq!(entry.status, IdentityStatus::Verified);
        assert_eq!(entry.role, Some(Role::Bot));
    }

    #[tokio::test]
    async fn same_identity_never_has_two_live_entries() {
        let hub = spawn(10);
        let first = verified(&hub, "7").await;
        let second = verified(&hub, "7").await;

        let snap = hub.snapshot();
        let bound: Vec<_> = snap
            .sessions
            .iter()
            .filter(|s| s.id == Some(SessionId::from("7")))
            .collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound.first().map(|s| s.conn), Some(second.conn));
        assert!(first.queue.is_closed());
        assert_eq!(hub.stats().counters.superseded, 1);
    }

    #[tokio::test]
    async fn stale_unregister_does_not_remove_successor() {
        let hub = spawn(10);
        let first = verified(&hub, "7").await;
        let second = verified(&hub, "7").await;
        // The superseded session's teardown arrives late.
        hub.unregister(first.conn);
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        let snap = hub.snapshot();
        assert_eq!(snap.find(&SessionId::from("7")).map(|s| s.conn), Some(second.conn));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = spawn(10);
        let session = verified(&hub, "1").await;
        hub.unregister(session.conn);
        hub.unregister(session.conn);
        hub.unregister(ConnectionId::new(9_999));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(hub.snapshot().live(), 0);
        assert!(session.queue.is_closed());
    }

    #[tokio::test]
    async fn pending_sessions_receive_no_broadcasts() {
        let hub = spawn(10);
        let Ok(pending) = connect(&hub).await else {
            panic!("registration failed");
        };
        for targeting in [Targeting::Everyone, Targeting::SendAllOnly] {
            let _ = hub.broadcast(message(targeting));
        }
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert!(pending.queue.is_empty());
    }

    #[tokio::test]
    async fn send_none_round_trip() {
        let hub = spawn(10);
        let a = verified(&hub, "a").await;
        let _ = a.drain().await;

        let _ = hub.broadcast(message(Targeting::Everyone));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(a.events().await.len(), 1);

        let _ = hub.set_flags(
            FlagTarget::Session(SessionId::from("a")),
            FlagUpdate {
                send_all: None,
                send_none: Some(true),
            },
        );
        let _ = hub.broadcast(message(Targeting::Everyone));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert!(a.events().await.is_empty());

        let _ = hub.broadcast(message(Targeting::Explicit(vec![SessionId::from("a")])));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        let events = a.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().map(|e| e["kind"].clone()), Some("vote".into()));
    }

    #[tokio::test]
    async fn flags_are_acknowledged_to_the_session() {
        let hub = spawn(10);
        let a = verified(&hub, "a").await;
        let _ = a.drain().await;
        let _ = hub.set_flags(
            FlagTarget::Connection(a.conn),
            FlagUpdate {
                send_all: Some(true),
                send_none: None,
            },
        );
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        let frames = a.drain().await;
        assert!(matches!(
            frames.first(),
            Some((WsMessageType::Response, p)) if p["send_all"] == true
        ));
    }

    #[tokio::test]
    async fn closed_queue_marks_pump_down_and_removes_session() {
        let hub = spawn(10);
        let a = verified(&hub, "a").await;
        a.queue.close();
        let _ = hub.broadcast(message(Targeting::Everyone));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(hub.snapshot().live(), 0);
    }

    #[tokio::test]
    async fn per_recipient_order_is_fifo() {
        let hub = spawn(10);
        let a = verified(&hub, "a").await;
        let _ = a.drain().await;
        for n in 0..5 {
            let _ = hub.broadcast(BroadcastMessage::new(
                "seq",
                Targeting::Everyone,
                serde_json::json!(n),
            ));
        }
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        let seq: Vec<_> = a.events().await.into_iter().map(|e| e["data"].clone()).collect();
        assert_eq!(seq, (0..5).map(serde_json::Value::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn shutdown_closes_every_session() {
        let hub = spawn(10);
        let a = verified(&hub, "a").await;
        hub.shutdown();
        let mut rx = hub.subscribe();
        let waited = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.live() == 0));
        let Ok(_) = waited.await else {
            panic!("snapshot never emptied");
        };
        assert!(a.queue.is_closed());
        assert!(matches!(hub.flush().await, Err(GatewayError::HubUnavailable)));
    }
}
