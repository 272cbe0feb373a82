//! Cloneable front door to the hub.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::command::{Command, FlagTarget, FlagUpdate, RegisterError, SessionHandle};
use super::control::{Hub, HubConfig};
use super::stats::{HubCounters, HubSnapshot, HubStats};
use crate::domain::{BroadcastMessage, ChannelRateLimiter, ConnectionId, SessionIdentity};
use crate::error::GatewayError;

/// Submits requests to the hub control loop.
///
/// Every method enqueues without blocking. Requests from one handle are
/// processed in submission order.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Arc<HubSnapshot>>,
    counters: Arc<HubCounters>,
    next_conn: Arc<AtomicU64>,
    max_connections: usize,
}

impl HubHandle {
    /// Spawns the control loop on the current runtime.
    ///
    /// `limiter`, if given, is pruned periodically by the loop.
    #[must_use]
    pub fn spawn(
        config: HubConfig,
        limiter: Option<Arc<ChannelRateLimiter>>,
    ) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(Arc::new(HubSnapshot::default()));
        let counters = Arc::new(HubCounters::default());

        let hub = Hub::new(config, Arc::clone(&counters), snapshot_tx, limiter);
        let task = tokio::spawn(hub.run(rx));

        let handle = Self {
            commands,
            snapshot,
            counters,
            next_conn: Arc::new(AtomicU64::new(1)),
            max_connections: config.max_connections,
        };
        (handle, task)
    }

    fn submit(&self, command: Command) -> Result<(), GatewayError> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::HubUnavailable)
    }

    /// Allocates the id for a newly accepted connection.
    #[must_use]
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    /// Admits a session in the `Pending` state.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::AtCapacity`] if the registry is full.
    /// - [`GatewayError::HubUnavailable`] if the control loop has stopped.
    /// - [`GatewayError::Internal`] if the connection id is already taken.
    pub async fn register(&self, session: SessionHandle) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Register { session, reply })?;
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(RegisterError::AtCapacity { .. })) => Err(GatewayError::AtCapacity),
            Ok(Err(e @ RegisterError::Duplicate)) => Err(GatewayError::Internal(e.to_string())),
            Err(_) => Err(GatewayError::HubUnavailable),
        }
    }

    /// Marks a registered session verified and binds its identity. An older
    /// connection bound to the same id is closed.
    pub fn verify(&self, conn: ConnectionId, identity: SessionIdentity) {
        if self.submit(Command::Verify { conn, identity }).is_err() {
            tracing::debug!(%conn, "hub gone, verification dropped");
        }
    }

    /// Removes a session. Idempotent; unknown connections are ignored.
    pub fn unregister(&self, conn: ConnectionId) {
        if self.submit(Command::Unregister { conn }).is_err() {
            tracing::debug!(%conn, "hub gone, unregister dropped");
        }
    }

    /// Changes broadcast eligibility of a verified session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubUnavailable`] if the control loop has
    /// stopped.
    pub fn set_flags(&self, target: FlagTarget, update: FlagUpdate) -> Result<(), GatewayError> {
        self.submit(Command::SetFlags { target, update })
    }

    /// Submits a message for routed delivery. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubUnavailable`] if the control loop has
    /// stopped.
    pub fn broadcast(&self, message: BroadcastMessage) -> Result<(), GatewayError> {
        self.submit(Command::Broadcast { message })
    }

    /// Resolves once every request submitted before it has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubUnavailable`] if the control loop has
    /// stopped.
    pub async fn flush(&self) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Flush { reply })?;
        rx.await.map_err(|_| GatewayError::HubUnavailable)
    }

    /// Stops the control loop and closes every session queue.
    pub fn shutdown(&self) {
        let _ = self.submit(Command::Shutdown);
    }

    /// Latest registry snapshot plus current counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            snapshot: self.snapshot().as_ref().clone(),
            counters: self.counters.snapshot(),
        }
    }

    /// Latest registry snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HubSnapshot> {
        let current = self.snapshot.borrow();
        Arc::clone(&*current)
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<HubSnapshot>> {
        self.snapshot.clone()
    }

    /// Shared counters, for sessions to record their own outcomes.
    #[must_use]
    pub fn counters(&self) -> &HubCounters {
        &self.counters
    }

    /// Configured connection limit.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Returns `true` if the last snapshot shows a full registry.
    ///
    /// Advisory only; [`register`](Self::register) is authoritative.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.snapshot.borrow().live() >= self.max_connections
    }
}
