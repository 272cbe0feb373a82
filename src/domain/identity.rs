//! Identity types: role, credential, and verification status.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::SessionId;

/// Marker rendered in place of any credential.
pub const REDACTED: &str = "[redacted]";

/// Whether a connection belongs to a bot or to a human/service user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A bot process.
    Bot,
    /// A human user or an internal service.
    User,
}

impl Role {
    /// Maps the handshake `bot` flag to a role.
    #[must_use]
    pub const fn from_bot_flag(bot: bool) -> Self {
        if bot { Self::Bot } else { Self::User }
    }

    /// Returns `true` for [`Role::Bot`].
    #[must_use]
    pub const fn is_bot(self) -> bool {
        matches!(self, Self::Bot)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bot => f.write_str("bot"),
            Self::User => f.write_str("user"),
        }
    }
}

/// An opaque secret presented by a client or held by a credential store.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wraps a secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret bytes for comparison.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns `true` if the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Verification stage of a session's credential.
///
/// Only ever advances `Pending → Verified` or `Pending → Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    /// Connected, handshake not yet checked.
    Pending,
    /// Credential checked and accepted.
    Verified,
    /// Credential refused or handshake deadline expired.
    Rejected,
}

impl IdentityStatus {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Verified) | (Self::Pending, Self::Rejected)
        )
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Verified => f.write_str("verified"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// A verified identity bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Claimed and verified session id.
    pub id: SessionId,
    /// Bot or user.
    pub role: Role,
    /// Rate-limit channel the session's deliveries are charged against.
    pub channel: String,
}

impl SessionIdentity {
    /// Binds a verified `(id, role)` pair.
    ///
    /// The rate-limit channel is always derived here, never taken from the
    /// client, so a session can only be charged against its own bucket.
    #[must_use]
    pub fn new(id: SessionId, role: Role) -> Self {
        let channel = rate_limit_channel(role, &id);
        Self { id, role, channel }
    }
}

/// Role-qualified bucket key: bot 5 and user 5 never share a quota.
#[must_use]
pub fn rate_limit_channel(role: Role, id: &SessionId) -> String {
    format!("{role}:{id}")
}
