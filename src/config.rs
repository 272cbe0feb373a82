//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Components never read the environment
//! themselves; they receive the derived [`HubConfig`], [`SessionConfig`]
//! and [`RateLimitConfig`].

use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::RateLimitConfig;
use crate::domain::identity::REDACTED;
use crate::hub::HubConfig;
use crate::ws::SessionConfig;

/// A configuration value was present but unusable.
#[derive(Debug, thiserror::Error)]
#[error("invalid {key}: {reason}")]
pub struct ConfigError {
    /// Environment variable name.
    pub key: &'static str,
    /// What was wrong with it.
    pub reason: String,
}

impl ConfigError {
    fn new(key: &'static str, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Clone)]
pub struct GatewayConfig {
    /// TCP address to bind when no Unix socket is configured.
    pub listen_addr: SocketAddr,

    /// Unix domain socket path; takes precedence over `listen_addr`.
    pub listen_socket: Option<PathBuf>,

    /// PostgreSQL connection string for credential lookups. When unset,
    /// credentials come from `static_credentials`.
    pub database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// In-memory credentials, `bot:ID=TOKEN,user:ID=TOKEN`.
    pub static_credentials: Option<String>,

    /// Shared secret for `POST /github`. The endpoint is disabled without it.
    pub github_webhook_secret: Option<String>,

    /// Most concurrent sessions.
    pub hub_max_connections: usize,

    /// Seconds a new session has to complete its handshake.
    pub handshake_timeout_secs: u64,

    /// Malformed handshake frames tolerated before rejection.
    pub max_handshake_attempts: u32,

    /// Event frames buffered per session.
    pub outbound_queue_capacity: usize,

    /// Rate-limit bucket size per channel.
    pub rate_limit_burst: u32,

    /// Tokens replenished per second per channel.
    pub rate_limit_refill_per_sec: u32,

    /// Longest single backoff sleep of a throttled session, in ms.
    pub rate_limit_retry_ms: u64,

    /// Seconds between WebSocket pings.
    pub ping_interval_secs: u64,

    /// Seconds of inbound silence before a session is dropped.
    pub pong_wait_secs: u64,

    /// Largest accepted inbound WebSocket frame.
    pub max_frame_bytes: usize,

    /// Per-request timeout for REST endpoints.
    pub request_timeout_secs: u64,

    /// Log output format.
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unparsable `LISTEN_ADDR`, a zero
    /// rate-limit setting, or a keepalive window not longer than the ping
    /// interval.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::new("LISTEN_ADDR", e.to_string()))?;

        let config = Self {
            listen_addr,
            listen_socket: var("LISTEN_SOCKET").map(PathBuf::from),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10),
            database_connect_timeout_secs: parse_or(&var, "DATABASE_CONNECT_TIMEOUT_SECS", 5),
            static_credentials: var("STATIC_CREDENTIALS"),
            github_webhook_secret: var("GITHUB_WEBHOOK_SECRET"),
            hub_max_connections: parse_or(&var, "HUB_MAX_CONNECTIONS", 10_000),
            handshake_timeout_secs: parse_or(&var, "HANDSHAKE_TIMEOUT_SECS", 10),
            max_handshake_attempts: parse_or(&var, "MAX_HANDSHAKE_ATTEMPTS", 3),
            outbound_queue_capacity: parse_or(&var, "OUTBOUND_QUEUE_CAPACITY", 256),
            rate_limit_burst: parse_or(&var, "RATE_LIMIT_BURST", 30),
            rate_limit_refill_per_sec: parse_or(&var, "RATE_LIMIT_REFILL_PER_SEC", 10),
            rate_limit_retry_ms: parse_or(&var, "RATE_LIMIT_RETRY_MS", 100),
            ping_interval_secs: parse_or(&var, "PING_INTERVAL_SECS", 30),
            pong_wait_secs: parse_or(&var, "PONG_WAIT_SECS", 60),
            max_frame_bytes: parse_or(&var, "MAX_FRAME_BYTES", 64 * 1024),
            request_timeout_secs: parse_or(&var, "REQUEST_TIMEOUT_SECS", 30),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json" | "JSON") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit_config()?;
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::new("PING_INTERVAL_SECS", "must be positive"));
        }
        if self.pong_wait_secs <= self.ping_interval_secs {
            return Err(ConfigError::new(
                "PONG_WAIT_SECS",
                "must be longer than PING_INTERVAL_SECS",
            ));
        }
        if self.max_handshake_attempts == 0 {
            return Err(ConfigError::new("MAX_HANDSHAKE_ATTEMPTS", "must be positive"));
        }
        Ok(())
    }

    /// Hub limits.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.hub_max_connections,
            ..HubConfig::default()
        }
    }

    /// Per-session timing and sizing.
    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            max_handshake_attempts: self.max_handshake_attempts,
            outbound_capacity: self.outbound_queue_capacity,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            rate_limit_retry: Duration::from_millis(self.rate_limit_retry_ms),
            max_frame_bytes: self.max_frame_bytes,
        }
    }

    /// Rate limiter quota.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if burst or refill rate is zero.
    pub fn rate_limit_config(&self) -> Result<RateLimitConfig, ConfigError> {
        let burst = NonZeroU32::new(self.rate_limit_burst)
            .ok_or_else(|| ConfigError::new("RATE_LIMIT_BURST", "must be positive"))?;
        let refill_per_second = NonZeroU32::new(self.rate_limit_refill_per_sec)
            .ok_or_else(|| ConfigError::new("RATE_LIMIT_REFILL_PER_SEC", "must be positive"))?;
        Ok(RateLimitConfig {
            burst,
            refill_per_second,
        })
    }

    /// Per-request timeout for REST endpoints.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| REDACTED);
        f.debug_struct("GatewayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("listen_socket", &self.listen_socket)
            .field("database_url", &redact(&self.database_url))
            .field("database_max_connections", &self.database_max_connections)
            .field("static_credentials", &redact(&self.static_credentials))
            .field("github_webhook_secret", &redact(&self.github_webhook_secret))
            .field("hub_max_connections", &self.hub_max_connections)
            .field("session", &self.session_config())
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("rate_limit_refill_per_sec", &self.rate_limit_refill_per_sec)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparsable setting, using default");
            default
        }),
        None => default,
    }
}
