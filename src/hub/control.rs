//! The hub control loop.
//!
//! A single task owns the registry and processes [`Command`]s in the order
//! they were submitted. Nothing else reads or writes the map, so it needs
//! no lock. The loop never awaits I/O: delivering to a session is a
//! synchronous push onto that session's bounded queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::command::{Command, FlagTarget, FlagUpdate, RegisterError, SessionHandle};
use super::stats::{Counter, HubCounters, HubSnapshot, SessionStats};
use crate::domain::{
    BroadcastMessage, ChannelRateLimiter, ConnectionId, IdentityStatus, RouteCandidate, SessionId,
    SessionIdentity, select_recipients,
};
use crate::ws::messages::{WsMessage, WsMessageType};
use crate::ws::outbound::{OutboundFrame, PushOutcome};

/// Hub limits and housekeeping cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Most sessions (pending or verified) registered at once.
    pub max_connections: usize,
    /// How often idle rate-limit buckets are forgotten.
    pub maintenance_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    handle: SessionHandle,
    identity: Option<SessionIdentity>,
    status: IdentityStatus,
    send_all: bool,
    send_none: bool,
    pump_healthy: bool,
}

impl SessionEntry {
    fn pending(handle: SessionHandle) -> Self {
        Self {
            handle,
            identity: None,
            status: IdentityStatus::Pending,
            send_all: false,
            send_none: false,
            pump_healthy: true,
        }
    }

    fn candidate(&self) -> RouteCandidate<'_> {
        RouteCandidate {
            conn: self.handle.conn,
            id: self.identity.as_ref().map(|i| &i.id),
            status: self.status,
            send_all: self.send_all,
            send_none: self.send_none,
        }
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            conn: self.handle.conn,
            id: self.identity.as_ref().map(|i| i.id.clone()),
            status: self.status,
            role: self.identity.as_ref().map(|i| i.role),
            channel: self.identity.as_ref().map(|i| i.channel.clone()),
            send_all: self.send_all,
            send_none: self.send_none,
            pump_healthy: self.pump_healthy,
            queued: self.handle.outbound.len(),
            connected_at: self.handle.connected_at,
        }
    }

    fn push_control(&self, msg: &WsMessage) -> PushOutcome {
        self.handle
            .outbound
            .push(OutboundFrame::Control(msg.to_text().into()))
    }
}

/// Registry owner. Constructed by [`super::HubHandle::spawn`].
#[derive(Debug)]
pub(crate) struct Hub {
    config: HubConfig,
    sessions: BTreeMap<ConnectionId, SessionEntry>,
    by_id: HashMap<SessionId, ConnectionId>,
    counters: Arc<HubCounters>,
    snapshot: watch::Sender<Arc<HubSnapshot>>,
    limiter: Option<Arc<ChannelRateLimiter>>,
}

impl Hub {
    pub(crate) fn new(
        config: HubConfig,
        counters: Arc<HubCounters>,
        snapshot: watch::Sender<Arc<HubSnapshot>>,
        limiter: Option<Arc<ChannelRateLimiter>>,
    ) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
            by_id: HashMap::new(),
            counters,
            snapshot,
            limiter,
        }
    }

    /// Processes commands until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut maintenance = tokio::time::interval(self.config.maintenance_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(max_connections = self.config.max_connections, "hub control loop started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        break;
                    }
                }
                _ = maintenance.tick() => {
                    if let Some(limiter) = &self.limiter {
                        limiter.retain_recent();
                    }
                }
            }
        }

        self.close_all();
        tracing::info!("hub control loop stopped");
    }

    /// Applies one command. Returns `false` when the loop should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Register { session, reply } => {
                let conn = session.conn;
                let result = self.register(session);
                if reply.send(result).is_err() && result.is_ok() {
                    // The session task went away before learning it was
                    // admitted; nobody is left to unregister it.
                    self.unregister(conn);
                }
            }
            Command::Verify { conn, identity } => self.verify(conn, identity),
            Command::Unregister { conn } => self.unregister(conn),
            Command::SetFlags { target, update } => self.set_flags(&target, update),
            Command::Broadcast { message } => self.broadcast(&message),
            Command::Flush { reply } => {
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn register(&mut self, session: SessionHandle) -> Result<(), RegisterError> {
        let conn = session.conn;
        if self.sessions.contains_key(&conn) {
            tracing::warn!(%conn, "duplicate registration refused");
            return Err(RegisterError::Duplicate);
        }
        if self.sessions.len() >= self.config.max_connections {
            self.counters.incr(Counter::Refused);
            tracing::warn!(%conn, max = self.config.max_connections, "hub at capacity, refusing connection");
            return Err(RegisterError::AtCapacity {
                max: self.config.max_connections,
            });
        }

        self.sessions.insert(conn, SessionEntry::pending(session));
        self.counters.incr(Counter::Accepted);
        tracing::debug!(%conn, live = self.sessions.len(), "session registered");
        self.publish();
        Ok(())
    }

    fn verify(&mut self, conn: ConnectionId, identity: SessionIdentity) {
        match self.sessions.get(&conn) {
            None => {
                tracing::debug!(%conn, "verify for unregistered connection ignored");
                return;
            }
            Some(entry) if entry.status != IdentityStatus::Pending => {
                tracing::warn!(%conn, status = %entry.status, "repeated verification ignored");
                return;
            }
            Some(_) => {}
        }

        if let Some(&previous) = self.by_id.get(&identity.id)
            && previous != conn
        {
            tracing::info!(session = %identity.id, old = %previous, new = %conn, "superseding older connection");
            self.remove(previous);
            self.counters.incr(Counter::Superseded);
        }

        let Some(entry) = self.sessions.get_mut(&conn) else {
            return;
        };
        let ready = WsMessage::new(
            WsMessageType::Ready,
            serde_json::json!({
                "conn": conn.get(),
                "id": identity.id,
                "bot": identity.role.is_bot(),
                "channel": identity.channel,
                "send_all": entry.send_all,
                "send_none": entry.send_none,
            }),
        );
        tracing::info!(%conn, session = %identity.id, role = %identity.role, channel = %identity.channel, "session verified");
        self.by_id.insert(identity.id.clone(), conn);
        entry.identity = Some(identity);
        entry.status = IdentityStatus::Verified;
        self.counters.incr(Counter::Verified);

        if entry.push_control(&ready) == PushOutcome::Closed {
            self.mark_dead(conn);
        }
        self.publish();
    }

    fn unregister(&mut self, conn: ConnectionId) {
        if self.remove(conn).is_some() {
            tracing::debug!(%conn, live = self.sessions.len(), "session unregistered");
            self.publish();
        }
    }

    fn set_flags(&mut self, target: &FlagTarget, update: FlagUpdate) {
        let conn = match target {
            FlagTarget::Connection(conn) => Some(*conn),
            FlagTarget::Session(id) => self.by_id.get(id).copied(),
        };
        let Some(entry) = conn.and_then(|c| self.sessions.get_mut(&c)) else {
            tracing::debug!(?target, "flag change for unknown session ignored");
            return;
        };
        if entry.status != IdentityStatus::Verified {
            tracing::debug!(conn = %entry.handle.conn, "flag change before verification ignored");
            return;
        }

        if let Some(send_all) = update.send_all {
            entry.send_all = send_all;
        }
        if let Some(send_none) = update.send_none {
            entry.send_none = send_none;
        }
        let conn = entry.handle.conn;
        tracing::debug!(%conn, send_all = entry.send_all, send_none = entry.send_none, "session flags updated");

        let ack = WsMessage::new(
            WsMessageType::Response,
            serde_json::json!({
                "op": "flags",
                "send_all": entry.send_all,
                "send_none": entry.send_none,
            }),
        );
        if entry.push_control(&ack) == PushOutcome::Closed {
            self.mark_dead(conn);
        }
        self.publish();
    }

    fn broadcast(&mut self, message: &BroadcastMessage) {
        self.counters.incr(Counter::Broadcasts);

        let recipients = select_recipients(
            &message.targeting,
            self.sessions.values().map(SessionEntry::candidate),
        );
        if recipients.is_empty() {
            tracing::debug!(kind = %message.kind, targeting = ?message.targeting, "broadcast matched no sessions");
            return;
        }

        let text: Arc<str> = WsMessage::new(
            WsMessageType::Event,
            serde_json::json!({ "kind": message.kind, "data": message.payload.as_ref() }),
        )
        .to_text()
        .into();

        let mut dead = Vec::new();
        let mut delivered = 0_u64;
        for conn in &recipients {
            let Some(entry) = self.sessions.get(conn) else {
                continue;
            };
            match entry.handle.outbound.push(OutboundFrame::Event(Arc::clone(&text))) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    self.counters.incr(Counter::Dropped);
                    tracing::debug!(%conn, "outbound queue full, dropped oldest event");
                }
                PushOutcome::Closed => dead.push(*conn),
            }
        }
        self.counters.add(Counter::Deliveries, delivered);
        tracing::debug!(kind = %message.kind, recipients = recipients.len(), delivered, "broadcast dispatched");

        if !dead.is_empty() {
            for conn in dead {
                self.mark_dead(conn);
            }
            self.publish();
        }
    }

    /// The write loop is gone: flag the entry and drop it in the same step.
    fn mark_dead(&mut self, conn: ConnectionId) {
        if let Some(entry) = self.sessions.get_mut(&conn) {
            entry.pump_healthy = false;
            tracing::debug!(%conn, "message pump down, removing session");
        }
        self.remove(conn);
    }

    fn remove(&mut self, conn: ConnectionId) -> Option<SessionEntry> {
        let entry = self.sessions.remove(&conn)?;
        if let Some(identity) = &entry.identity
            && self.by_id.get(&identity.id) == Some(&conn)
        {
            self.by_id.remove(&identity.id);
        }
        entry.handle.outbound.close();
        Some(entry)
    }

    fn close_all(&mut self) {
        for entry in self.sessions.values() {
            entry.handle.outbound.close();
        }
        self.sessions.clear();
        self.by_id.clear();
        self.publish();
    }

    fn publish(&self) {
        let snapshot = HubSnapshot {
            sessions: self.sessions.values().map(SessionEntry::stats).collect(),
        };
        self.snapshot.send_replace(Arc::new(snapshot));
    }
}
