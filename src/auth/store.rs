//! Credential lookup collaborators.
//!
//! [`CredentialStore`] is the seam between the identity verifier and
//! wherever API tokens live. The production store is
//! [`crate::persistence::PostgresCredentialStore`]; [`StaticCredentialStore`]
//! serves development setups and tests.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::domain::{Credential, Role, SessionId};
use crate::error::GatewayError;

/// Looks up the stored credential for a claimed identity.
#[async_trait]
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Returns the stored credential for `(id, role)`, or `None` if no such
    /// identity exists.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CredentialLookup`] when the backend fails.
    async fn lookup(&self, id: &SessionId, role: Role) -> Result<Option<Credential>, GatewayError>;
}

/// In-memory credential table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    entries: HashMap<(Role, SessionId), Credential>,
}

impl StaticCredentialStore {
    /// Creates an empty store. Every lookup misses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a credential.
    #[must_use]
    pub fn with(mut self, role: Role, id: impl Into<SessionId>, token: &str) -> Self {
        self.entries.insert((role, id.into()), Credential::new(token));
        self
    }

    /// Parses `bot:ID=TOKEN,user:ID=TOKEN` entries.
    ///
    /// Whitespace around entries is ignored and an empty string yields an
    /// empty store.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] naming the first malformed
    /// entry (without echoing its token).
    pub fn parse(list: &str) -> Result<Self, GatewayError> {
        let mut store = Self::new();
        for (index, entry) in list.split(',').map(str::trim).enumerate() {
            if entry.is_empty() {
                continue;
            }
            let malformed =
                || GatewayError::InvalidRequest(format!("malformed credential entry #{index}"));
            let (who, token) = entry.split_once('=').ok_or_else(malformed)?;
            let (role, id) = who.split_once(':').ok_or_else(malformed)?;
            let role = match role {
                "bot" => Role::Bot,
                "user" => Role::User,
                _ => return Err(malformed()),
            };
            if id.is_empty() || token.is_empty() {
                return Err(malformed());
            }
            store = store.with(role, id, token);
        }
        Ok(store)
    }

    /// Number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no credentials are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn lookup(&self, id: &SessionId, role: Role) -> Result<Option<Credential>, GatewayError> {
        Ok(self.entries.get(&(role, id.clone())).cloned())
    }
}
