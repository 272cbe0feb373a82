//! PostgreSQL credential store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::auth::CredentialStore;
use crate::domain::{Credential, Role, SessionId};
use crate::error::GatewayError;

/// Reads API tokens from the `bots` and `users` tables using `sqlx::PgPool`.
///
/// Both tables are keyed by a `BIGINT` id, so non-numeric session ids can
/// never match and are answered without a query.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CredentialLookup`] if the database is
    /// unreachable within `connect_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    const fn query_for(role: Role) -> &'static str {
        match role {
            Role::Bot => "SELECT api_token FROM bots WHERE bot_id = $1",
            Role::User => "SELECT api_token FROM users WHERE user_id = $1",
        }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn lookup(&self, id: &SessionId, role: Role) -> Result<Option<Credential>, GatewayError> {
        let Some(numeric_id) = id.as_i64() else {
            return Ok(None);
        };

        let token = sqlx::query_scalar::<_, Option<String>>(Self::query_for(role))
            .bind(numeric_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(token.flatten().map(Credential::new))
    }
}
