//! One physical WebSocket connection.
//!
//! A session registers with the hub as `Pending`, waits for a handshake
//! frame, and once verified runs two loops joined with `tokio::select!`:
//!
//! - the read loop answers `ping`/`flags` control frames and enforces the
//!   keepalive deadline;
//! - the write loop drains the outbound queue, gates event frames through
//!   the rate limiter and sends periodic WebSocket pings.
//!
//! Whichever loop ends first ends the session. The hub entry is always
//! removed and a close frame is sent on a best-effort basis.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};

use super::messages::{ControlFrame, HandshakeFrame, WsMessage, WsMessageType};
use super::outbound::{OutboundFrame, OutboundQueue};
use super::state::{InvalidTransition, Lifecycle, SessionState};
use crate::auth::IdentityVerifier;
use crate::domain::{
    ChannelRateLimiter, ConnectionId, IdentityStatus, Role, SessionId, SessionIdentity,
};
use crate::error::GatewayError;
use crate::hub::{Counter, FlagTarget, FlagUpdate, HubHandle, SessionHandle};

/// Per-session timing and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Absolute time allowed between admission and a verified handshake.
    pub handshake_timeout: Duration,
    /// Malformed handshake frames tolerated before the session is rejected.
    pub max_handshake_attempts: u32,
    /// Event frames buffered per session before the oldest is dropped.
    pub outbound_capacity: usize,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
    /// A verified session with no inbound frame for this long is closed.
    pub pong_wait: Duration,
    /// Upper bound on a single rate-limit backoff sleep.
    pub rate_limit_retry: Duration,
    /// Largest accepted inbound frame, enforced at upgrade time.
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            max_handshake_attempts: 3,
            outbound_capacity: 256,
            ping_interval: Duration::from_secs(30),
            pong_wait: Duration::from_secs(60),
            rate_limit_retry: Duration::from_millis(100),
            max_frame_bytes: 64 * 1024,
        }
    }
}

/// Why a session ended.
///
/// Logged when the session finishes; never surfaced over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The hub refused registration.
    #[error("hub at capacity")]
    AtCapacity,
    /// The hub control loop is gone.
    #[error("hub unavailable")]
    HubUnavailable,
    /// No verified handshake before the deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// Too many malformed handshake frames.
    #[error("{0} malformed handshake frames")]
    TooManyAttempts(u32),
    /// The credential did not match.
    #[error("credential rejected for session {0}")]
    Rejected(SessionId),
    /// No inbound frame within the keepalive window.
    #[error("keepalive expired")]
    KeepaliveExpired,
    /// The peer kept sending but stopped reading its replies.
    #[error("peer is not reading its replies")]
    SlowConsumer,
    /// The hub closed the outbound queue (superseded, dead or shutdown).
    #[error("closed by hub")]
    Evicted,
    /// Socket read or write failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Internal state machine misuse.
    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),
}

impl SessionError {
    /// Returns `true` for handshake failures, which count as rejections.
    #[must_use]
    pub const fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout | Self::TooManyAttempts(_) | Self::Rejected(_)
        )
    }

    /// WebSocket close code sent to the peer.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::AtCapacity => close_code::AGAIN,
            Self::HandshakeTimeout | Self::TooManyAttempts(_) | Self::Rejected(_) => {
                close_code::POLICY
            }
            Self::KeepaliveExpired | Self::Evicted => close_code::AWAY,
            Self::SlowConsumer => close_code::POLICY,
            Self::HubUnavailable | Self::Transport(_) | Self::Lifecycle(_) => close_code::ERROR,
        }
    }

    const fn close_reason(&self) -> &'static str {
        match self {
            Self::AtCapacity => "try again later",
            Self::HandshakeTimeout => "handshake timeout",
            Self::TooManyAttempts(_) => "malformed handshake",
            Self::Rejected(_) => "invalid credentials",
            Self::KeepaliveExpired => "keepalive expired",
            Self::SlowConsumer => "replies not read",
            Self::Evicted => "session closed",
            Self::HubUnavailable | Self::Transport(_) | Self::Lifecycle(_) => "internal error",
        }
    }
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AtCapacity => Self::AtCapacity,
            _ => Self::HubUnavailable,
        }
    }
}

/// How long the final close frame may take to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

fn transport(err: impl Display) -> SessionError {
    SessionError::Transport(err.to_string())
}

/// Drives one connection from admission to close.
#[derive(Debug)]
pub struct ClientSession {
    conn: ConnectionId,
    hub: HubHandle,
    verifier: IdentityVerifier,
    limiter: Arc<ChannelRateLimiter>,
    config: SessionConfig,
    outbound: Arc<OutboundQueue>,
    lifecycle: Lifecycle,
}

impl ClientSession {
    /// Creates a session with a fresh connection id.
    #[must_use]
    pub fn new(
        hub: HubHandle,
        verifier: IdentityVerifier,
        limiter: Arc<ChannelRateLimiter>,
        config: SessionConfig,
    ) -> Self {
        Self {
            conn: hub.next_connection_id(),
            outbound: Arc::new(OutboundQueue::new(config.outbound_capacity)),
            hub,
            verifier,
            limiter,
            config,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Hub-assigned connection id.
    #[must_use]
    pub const fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Current lifecycle stage.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Runs the session over a full-duplex socket.
    ///
    /// # Errors
    ///
    /// Returns the reason the session ended; a clean client close is `Ok`.
    pub async fn run<S, E>(self, socket: S) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<Message, E>> + Sink<Message>,
        <S as Sink<Message>>::Error: Display,
        E: Display,
    {
        let (tx, rx) = socket.split();
        self.run_split(tx, rx).await
    }

    /// Runs the session over separate write and read halves.
    ///
    /// # Errors
    ///
    /// Returns the reason the session ended; a clean client close is `Ok`.
    pub async fn run_split<W, R, E>(mut self, mut tx: W, mut rx: R) -> Result<(), SessionError>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let conn = self.conn;
        let result = self.drive(&mut tx, &mut rx).await;
        match &result {
            Ok(()) => tracing::debug!(%conn, "client closed connection"),
            Err(e @ SessionError::Transport(_)) => {
                tracing::debug!(%conn, error = %e, "session transport failed");
            }
            Err(e) if e.is_admission() => tracing::info!(%conn, reason = %e, "handshake failed"),
            Err(e) => tracing::info!(%conn, reason = %e, "session ended"),
        }

        if !matches!(result, Err(SessionError::Transport(_))) {
            let (code, reason) = match &result {
                Ok(()) => (close_code::NORMAL, ""),
                Err(e) => (e.close_code(), e.close_reason()),
            };
            let frame = CloseFrame {
                code,
                reason: Utf8Bytes::from_static(reason),
            };
            let close = tx.send(Message::Close(Some(frame)));
            let _ = tokio::time::timeout(CLOSE_GRACE, close).await;
        }
        let _ = tokio::time::timeout(CLOSE_GRACE, tx.close()).await;

        self.hub.unregister(conn);
        self.outbound.close();
        self.lifecycle.finish();
        result
    }

    async fn drive<W, R, E>(&mut self, tx: &mut W, rx: &mut R) -> Result<(), SessionError>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        self.hub
            .register(SessionHandle::new(self.conn, Arc::clone(&self.outbound)))
            .await?;
        self.lifecycle.advance(SessionState::AwaitingIdentity)?;

        let identity = match self.handshake(tx, rx).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Ok(()),
            Err(e) => {
                if e.is_admission() {
                    self.lifecycle.advance(SessionState::Rejected)?;
                    self.hub.counters().incr(Counter::Rejected);
                }
                return Err(e);
            }
        };

        self.lifecycle.advance(SessionState::Verified)?;
        let channel: Arc<str> = Arc::from(identity.channel.as_str());
        self.hub.verify(self.conn, identity);

        let this = &*self;
        tokio::select! {
            result = this.read_loop(rx) => result,
            result = this.write_loop(tx, &channel) => result,
        }
    }

    /// Waits for a valid handshake. `Ok(None)` means the client left.
    async fn handshake<W, R, E>(
        &self,
        tx: &mut W,
        rx: &mut R,
    ) -> Result<Option<SessionIdentity>, SessionError>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let deadline = Instant::now() + self.config.handshake_timeout;
        let mut attempts = 0_u32;

        loop {
            let next = tokio::time::timeout_at(deadline, rx.next())
                .await
                .map_err(|_| SessionError::HandshakeTimeout)?;
            let frame = match next {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(transport(e)),
                Some(Ok(Message::Text(text))) => {
                    serde_json::from_str::<HandshakeFrame>(text.as_str()).ok()
                }
                Some(Ok(Message::Binary(_))) => None,
                Some(Ok(_)) => continue,
            };

            let Some(frame) = frame else {
                attempts += 1;
                tracing::debug!(conn = %self.conn, attempts, "malformed handshake frame");
                let reply = WsMessage::error(400, "malformed handshake frame");
                tx.send(Message::text(reply.to_text()))
                    .await
                    .map_err(transport)?;
                if attempts >= self.config.max_handshake_attempts {
                    return Err(SessionError::TooManyAttempts(attempts));
                }
                continue;
            };

            let role = Role::from_bot_flag(frame.bot);
            let status = tokio::time::timeout_at(
                deadline,
                self.verifier.verify(&frame.id, role, &frame.token),
            )
            .await
            .map_err(|_| SessionError::HandshakeTimeout)?;
            if status != IdentityStatus::Verified {
                return Err(SessionError::Rejected(frame.id));
            }

            return Ok(Some(SessionIdentity::new(frame.id, role)));
        }
    }

    async fn read_loop<R, E>(&self, rx: &mut R) -> Result<(), SessionError>
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        loop {
            // Every control frame read may queue a reply. Stop reading while
            // the replies are backed up so the peer's own TCP window applies.
            tokio::time::timeout(self.config.pong_wait, self.outbound.control_room())
                .await
                .map_err(|_| SessionError::SlowConsumer)?;

            let next = tokio::time::timeout(self.config.pong_wait, rx.next())
                .await
                .map_err(|_| SessionError::KeepaliveExpired)?;
            match next {
                None | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Err(e)) => return Err(transport(e)),
                Some(Ok(Message::Text(text))) => self.handle_control(text.as_str())?,
                Some(Ok(Message::Binary(_))) => {
                    self.reply(&WsMessage::error(400, "binary frames are not supported"));
                }
                // Ping/pong only refresh the keepalive deadline.
                Some(Ok(_)) => {}
            }
        }
    }

    fn handle_control(&self, text: &str) -> Result<(), SessionError> {
        match serde_json::from_str::<ControlFrame>(text) {
            Ok(ControlFrame::Ping) => {
                self.reply(&WsMessage::new(WsMessageType::Pong, serde_json::json!({})));
            }
            Ok(ControlFrame::Flags {
                send_all,
                send_none,
            }) => {
                self.hub.set_flags(
                    FlagTarget::Connection(self.conn),
                    FlagUpdate {
                        send_all,
                        send_none,
                    },
                )?;
            }
            Err(_) if serde_json::from_str::<HandshakeFrame>(text).is_ok() => {
                tracing::debug!(conn = %self.conn, "repeated handshake refused");
                self.reply(&WsMessage::error(409, "session already identified"));
            }
            Err(_) => self.reply(&WsMessage::error(400, "unknown control frame")),
        }
        Ok(())
    }

    fn reply(&self, msg: &WsMessage) {
        self.outbound.push(OutboundFrame::Control(msg.to_text().into()));
    }

    async fn write_loop<W>(&self, tx: &mut W, channel: &Arc<str>) -> Result<(), SessionError>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
    {
        let mut ping = tokio::time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = self.outbound.pop() => {
                    let Some(frame) = frame else {
                        return Err(SessionError::Evicted);
                    };
                    if !frame.is_control() {
                        self.throttle(channel).await;
                    }
                    tx.send(Message::text(frame.text().to_owned()))
                        .await
                        .map_err(transport)?;
                }
                _ = ping.tick() => {
                    tx.send(Message::Ping(Bytes::new())).await.map_err(transport)?;
                }
            }
        }
    }

    /// Waits until `channel` has a token. Throttled frames are delayed,
    /// never dropped.
    async fn throttle(&self, channel: &Arc<str>) {
        let cap = self.config.rate_limit_retry.max(Duration::from_millis(1));
        while let Err(wait) = self.limiter.check(channel) {
            let backoff = wait.min(cap);
            tracing::trace!(conn = %self.conn, channel = &**channel, ?backoff, "rate limited");
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::convert::Infallible;
    use std::pin::Pin;

    use futures_util::{sink, stream};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::auth::StaticCredentialStore;
    use crate::domain::{BroadcastMessage, RateLimitConfig, Targeting};
    use crate::hub::HubConfig;

    type ServerTx = Pin<Box<dyn Sink<Message, Error = &'static str> + Send>>;
    type ServerRx = Pin<Box<dyn Stream<Item = Result<Message, Infallible>> + Send>>;

    /// The client end of an in-memory socket.
    struct Peer {
        to_server: mpsc::UnboundedSender<Message>,
        from_server: mpsc::UnboundedReceiver<Message>,
    }

    impl Peer {
        fn send(&self, text: &str) {
            let _ = self.to_server.send(Message::text(text.to_owned()));
        }

        /// Next JSON frame, skipping WebSocket pings.
        async fn recv(&mut self) -> serde_json::Value {
            loop {
                match self.from_server.recv().await {
                    Some(Message::Text(text)) => {
                        let Ok(value) = serde_json::from_str(text.as_str()) else {
                            panic!("server sent invalid JSON");
                        };
                        return value;
                    }
                    Some(Message::Ping(_)) => {}
                    other => panic!("expected a text frame, got {other:?}"),
                }
            }
        }

        /// Skips text frames until the close frame.
        async fn recv_close(&mut self) -> u16 {
            loop {
                match self.from_server.recv().await {
                    Some(Message::Close(Some(frame))) => return frame.code,
                    Some(_) => {}
                    None => panic!("socket dropped without a close frame"),
                }
            }
        }
    }

    fn pipe() -> (ServerTx, ServerRx, Peer) {
        let (to_server, server_in) = mpsc::unbounded_channel::<Message>();
        let (server_out, from_server) = mpsc::unbounded_channel::<Message>();

        let tx = sink::unfold(server_out, |out, msg: Message| async move {
            out.send(msg).map_err(|_| "peer gone")?;
            Ok::<_, &'static str>(out)
        });
        let rx = stream::unfold(server_in, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok::<_, Infallible>(msg), rx))
        });
        (
            Box::pin(tx),
            Box::pin(rx),
            Peer {
                to_server,
                from_server,
            },
        )
    }

    fn hub(max_connections: usize) -> HubHandle {
        let (hub, _task) = HubHandle::spawn(
            HubConfig {
                max_connections,
                maintenance_interval: Duration::from_secs(3600),
            },
            None,
        );
        hub
    }

    fn verifier() -> IdentityVerifier {
        let store = StaticCredentialStore::new()
            .with(Role::Bot, "1", "bot-token")
            .with(Role::User, "2", "user-token");
        IdentityVerifier::new(Arc::new(store))
    }

    type SessionTask = JoinHandle<Result<(), SessionError>>;

    fn start(hub: &HubHandle, config: SessionConfig) -> (Peer, SessionTask) {
        let limiter = Arc::new(ChannelRateLimiter::new(RateLimitConfig::default()));
        let session = ClientSession::new(hub.clone(), verifier(), limiter, config);
        let (tx, rx, peer) = pipe();
        let task = tokio::spawn(session.run_split(tx, rx));
        (peer, task)
    }

    async fn finished(task: SessionTask) -> Result<(), SessionError> {
        let Ok(result) = task.await else {
            panic!("session task panicked");
        };
        result
    }

    async fn ready(hub: &HubHandle, id: &str, token: &str) -> (Peer, SessionTask) {
        let (mut peer, task) = start(hub, SessionConfig::default());
        peer.send(&format!(r#"{{"id": {id}, "bot": true, "token": "{token}"}}"#));
        let frame = peer.recv().await;
        assert_eq!(frame["type"], "ready");
        (peer, task)
    }

    #[tokio::test]
    async fn valid_handshake_is_verified() {
        let hub = hub(10);
        let (_peer, _task) = ready(&hub, "1", "bot-token").await;
        let snap = hub.snapshot();
        let Some(entry) = snap.find(&SessionId::from("1")) else {
            panic!("verified session missing");
        };
        assert_eq!(entry.status, IdentityStatus::Verified);
        assert_eq!(entry.channel.as_deref(), Some("bot:1"));
    }

    #[tokio::test]
    async fn client_cannot_choose_its_rate_limit_channel() {
        let hub = hub(10);
        let (mut peer, _task) = start(&hub, SessionConfig::default());
        peer.send(r#"{"id": 2, "bot": false, "token": "user-token", "channel": "bot:1"}"#);
        assert_eq!(peer.recv().await["type"], "ready");

        let snap = hub.snapshot();
        let Some(entry) = snap.find(&SessionId::from("2")) else {
            panic!("verified session missing");
        };
        assert_eq!(entry.channel.as_deref(), Some("user:2"));
    }

    #[tokio::test(start_paused = true)]
    async fn peer_that_never_reads_cannot_grow_the_queue() {
        let hub = hub(10);
        let limiter = Arc::new(ChannelRateLimiter::new(RateLimitConfig::default()));
        let config = SessionConfig {
            outbound_capacity: 4,
            ..SessionConfig::default()
        };
        let session = ClientSession::new(hub.clone(), verifier(), limiter, config);
        let queue = Arc::clone(&session.outbound);

        // Every write stalls forever, as with a peer whose receive window
        // is full.
        let stalled: ServerTx = Box::pin(sink::unfold((), |(), _msg: Message| {
            std::future::pending::<Result<(), &'static str>>()
        }));
        let (_tx, rx, peer) = pipe();
        peer.send(r#"{"id": 1, "bot": true, "token": "bot-token"}"#);
        for _ in 0..10_000 {
            peer.send(r#"{"op": "ping"}"#);
        }
        let task = tokio::spawn(session.run_split(stalled, rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(queue.len() <= config.outbound_capacity, "queued {}", queue.len());

        assert!(matches!(finished(task).await, Err(SessionError::SlowConsumer)));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(hub.snapshot().live(), 0);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_and_never_listed() {
        let hub = hub(10);
        let (mut peer, task) = start(&hub, SessionConfig::default());
        peer.send(r#"{"id": 1, "bot": true, "token": "wrong"}"#);
        assert_eq!(peer.recv_close().await, close_code::POLICY);
        assert!(matches!(finished(task).await, Err(SessionError::Rejected(_))));

        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        let stats = hub.stats();
        assert!(stats.snapshot.find(&SessionId::from("1")).is_none());
        assert_eq!(stats.snapshot.live(), 0);
        assert_eq!(stats.counters.rejected, 1);
    }

    #[tokio::test]
    async fn role_mismatch_is_rejected() {
        let hub = hub(10);
        let (mut peer, task) = start(&hub, SessionConfig::default());
        peer.send(r#"{"id": 2, "bot": true, "token": "user-token"}"#);
        assert_eq!(peer.recv_close().await, close_code::POLICY);
        assert!(finished(task).await.is_err());
    }

    #[tokio::test]
    async fn malformed_frames_count_toward_attempts() {
        let hub = hub(10);
        let (mut peer, task) = start(&hub, SessionConfig::default());
        for _ in 0..3 {
            peer.send("{\"id\": 1}");
            let frame = peer.recv().await;
            assert_eq!(frame["type"], "error");
            assert_eq!(frame["payload"]["code"], 400);
        }
        assert_eq!(peer.recv_close().await, close_code::POLICY);
        assert!(matches!(
            finished(task).await,
            Err(SessionError::TooManyAttempts(3))
        ));
    }

    #[tokio::test]
    async fn malformed_frame_can_be_followed_by_valid_handshake() {
        let hub = hub(10);
        let (mut peer, _task) = start(&hub, SessionConfig::default());
        peer.send("hello");
        assert_eq!(peer.recv().await["type"], "error");
        peer.send(r#"{"id": "1", "bot": true, "token": "bot-token"}"#);
        assert_eq!(peer.recv().await["type"], "ready");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out_during_handshake() {
        let hub = hub(10);
        let (mut peer, task) = start(&hub, SessionConfig::default());
        assert!(matches!(
            finished(task).await,
            Err(SessionError::HandshakeTimeout)
        ));
        assert_eq!(peer.recv_close().await, close_code::POLICY);
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(hub.snapshot().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_verified_session_expires() {
        let hub = hub(10);
        let (mut peer, task) = ready(&hub, "1", "bot-token").await;
        assert!(matches!(
            finished(task).await,
            Err(SessionError::KeepaliveExpired)
        ));
        assert_eq!(peer.recv_close().await, close_code::AWAY);
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let hub = hub(10);
        let (mut peer, _task) = ready(&hub, "1", "bot-token").await;
        peer.send(r#"{"op": "ping"}"#);
        assert_eq!(peer.recv().await["type"], "pong");
    }

    #[tokio::test]
    async fn repeated_handshake_is_refused() {
        let hub = hub(10);
        let (mut peer, _task) = ready(&hub, "1", "bot-token").await;
        peer.send(r#"{"id": 1, "bot": true, "token": "bot-token"}"#);
        let frame = peer.recv().await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["payload"]["code"], 409);
    }

    #[tokio::test]
    async fn send_none_blocks_untargeted_but_not_explicit() {
        let hub = hub(10);
        let (mut peer, _task) = ready(&hub, "1", "bot-token").await;

        peer.send(r#"{"op": "flags", "send_none": true}"#);
        let ack = peer.recv().await;
        assert_eq!(ack["type"], "response");
        assert_eq!(ack["payload"]["send_none"], true);

        let _ = hub.broadcast(BroadcastMessage::new(
            "vote",
            Targeting::Everyone,
            serde_json::json!(1),
        ));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        peer.send(r#"{"op": "ping"}"#);
        assert_eq!(peer.recv().await["type"], "pong");

        let _ = hub.broadcast(BroadcastMessage::new(
            "vote",
            Targeting::Explicit(vec![SessionId::from("1")]),
            serde_json::json!(2),
        ));
        let event = peer.recv().await;
        assert_eq!(event["type"], "event");
        assert_eq!(event["payload"]["data"], 2);
    }

    #[tokio::test]
    async fn newer_connection_supersedes_older() {
        let hub = hub(10);
        let (mut old, old_task) = ready(&hub, "1", "bot-token").await;
        let (_new, _new_task) = ready(&hub, "1", "bot-token").await;

        assert_eq!(old.recv_close().await, close_code::AWAY);
        assert!(matches!(finished(old_task).await, Err(SessionError::Evicted)));
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(hub.snapshot().live(), 1);
    }

    #[tokio::test]
    async fn full_hub_refuses_with_try_again_later() {
        let hub = hub(0);
        let (mut peer, task) = start(&hub, SessionConfig::default());
        assert_eq!(peer.recv_close().await, close_code::AGAIN);
        assert!(matches!(finished(task).await, Err(SessionError::AtCapacity)));
    }

    #[tokio::test]
    async fn client_close_unregisters() {
        let hub = hub(10);
        let (peer, task) = ready(&hub, "1", "bot-token").await;
        let _ = peer.to_server.send(Message::Close(None));
        assert!(finished(task).await.is_ok());
        let Ok(()) = hub.flush().await else {
            panic!("hub stopped");
        };
        assert_eq!(hub.snapshot().live(), 0);
    }

    #[test]
    fn close_codes_follow_failure_class() {
        assert_eq!(SessionError::AtCapacity.close_code(), close_code::AGAIN);
        assert_eq!(SessionError::HandshakeTimeout.close_code(), close_code::POLICY);
        assert_eq!(SessionError::Evicted.close_code(), close_code::AWAY);
        assert_eq!(SessionError::SlowConsumer.close_code(), close_code::POLICY);
        assert!(SessionError::Rejected(SessionId::from("1")).is_admission());
        assert!(!SessionError::KeepaliveExpired.is_admission());
    }
}
