//! relay-gateway server entry point.
//!
//! Starts the hub control loop and the Axum HTTP server with REST and
//! WebSocket endpoints, on TCP or a Unix domain socket.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tracing_subscriber::EnvFilter;

use relay_gateway::api;
use relay_gateway::app_state::AppState;
use relay_gateway::auth::{CredentialStore, IdentityVerifier, StaticCredentialStore};
use relay_gateway::config::{GatewayConfig, LogFormat};
use relay_gateway::domain::{ChannelRateLimiter, Credential};
use relay_gateway::hub::HubHandle;
use relay_gateway::notify::HubNotificationSink;
use relay_gateway::persistence::PostgresCredentialStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(?config, "starting relay-gateway");

    // Build hub
    let limiter = Arc::new(ChannelRateLimiter::new(config.rate_limit_config()?));
    let (hub, hub_task) = HubHandle::spawn(config.hub_config(), Some(Arc::clone(&limiter)));

    // Build application state
    let store = credential_store(&config).await?;
    let app_state = AppState {
        verifier: IdentityVerifier::new(store),
        limiter,
        session_config: config.session_config(),
        webhook_secret: config.github_webhook_secret.as_deref().map(Credential::new),
        sink: Arc::new(HubNotificationSink::new(hub.clone())),
        hub: hub.clone(),
    };
    if app_state.webhook_secret.is_none() {
        tracing::warn!("GITHUB_WEBHOOK_SECRET not set, POST /github is disabled");
    }

    let app = api::build_app(app_state, config.request_timeout());

    // Start server
    match &config.listen_socket {
        Some(path) => serve_unix(path, app, hub.clone()).await?,
        None => {
            let listener = tokio::net::TcpListener::bind(config.listen_addr)
                .await
                .with_context(|| format!("binding {}", config.listen_addr))?;
            tracing::info!(addr = %config.listen_addr, "server listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(hub.clone()))
                .await?;
        }
    }

    hub.shutdown();
    let _ = hub_task.await;
    tracing::info!("relay-gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Picks the credential backend: PostgreSQL when `DATABASE_URL` is set,
/// otherwise the static list.
async fn credential_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    if let Some(url) = &config.database_url {
        let store = PostgresCredentialStore::connect(
            url,
            config.database_max_connections,
            Duration::from_secs(config.database_connect_timeout_secs),
        )
        .await
        .context("connecting to credential database")?;
        tracing::info!("credentials served from PostgreSQL");
        return Ok(Arc::new(store));
    }

    let list = config.static_credentials.as_deref().unwrap_or_default();
    let store = StaticCredentialStore::parse(list).context("parsing STATIC_CREDENTIALS")?;
    if store.is_empty() {
        tracing::warn!("no credentials configured, every handshake will be rejected");
    } else {
        tracing::info!(entries = store.len(), "credentials served from static list");
    }
    Ok(Arc::new(store))
}

async fn serve_unix(path: &Path, app: Router, hub: HubHandle) -> anyhow::Result<()> {
    // A socket file left behind by an unclean exit blocks the bind.
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("removing stale socket {}", path.display()))?;
    }
    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("binding {}", path.display()))?;
    tracing::info!(socket = %path.display(), "server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await;
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(socket = %path.display(), error = %e, "could not remove socket file");
    }
    served.map_err(Into::into)
}

/// Resolves on Ctrl-C and closes every session so upgraded connections do
/// not outlive the server.
async fn shutdown_signal(hub: HubHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    hub.shutdown();
}
