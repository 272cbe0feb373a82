//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::domain::{ChannelRateLimiter, Credential};
use crate::hub::HubHandle;
use crate::notify::NotificationSink;
use crate::ws::SessionConfig;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Front door to the connection hub.
    pub hub: HubHandle,
    /// Handshake credential checks.
    pub verifier: IdentityVerifier,
    /// Outbound rate limiter shared by all sessions.
    pub limiter: Arc<ChannelRateLimiter>,
    /// Timing and sizing for new sessions.
    pub session_config: SessionConfig,
    /// Shared secret for `POST /github`; `None` disables the endpoint.
    pub webhook_secret: Option<Credential>,
    /// Where translated webhook notifications go.
    pub sink: Arc<dyn NotificationSink>,
}
