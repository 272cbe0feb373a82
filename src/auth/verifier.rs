//! Handshake credential verification.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::CredentialStore;
use crate::domain::{Credential, IdentityStatus, Role, SessionId};

/// Checks a presented credential against the stored one for the claimed
/// identity.
///
/// Fails closed: a lookup error, a missing record, an empty credential or
/// a mismatch all yield [`IdentityStatus::Rejected`]. The result is never
/// `Pending`.
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    store: Arc<dyn CredentialStore>,
}

impl IdentityVerifier {
    /// Creates a verifier backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Verifies `presented` for `(id, role)`.
    pub async fn verify(
        &self,
        id: &SessionId,
        role: Role,
        presented: &Credential,
    ) -> IdentityStatus {
        if presented.is_empty() {
            tracing::debug!(session = %id, %role, "empty credential");
            return IdentityStatus::Rejected;
        }

        let stored = match self.store.lookup(id, role).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::debug!(session = %id, %role, "no credential on record");
                return IdentityStatus::Rejected;
            }
            Err(e) => {
                tracing::warn!(session = %id, %role, error = %e, "credential lookup failed");
                return IdentityStatus::Rejected;
            }
        };

        if constant_time_eq(stored.expose(), presented.expose()) {
            IdentityStatus::Verified
        } else {
            tracing::debug!(session = %id, %role, token = %presented, "credential mismatch");
            IdentityStatus::Rejected
        }
    }
}

/// Compares two secrets without leaking where (or whether by length) they
/// differ: both sides are hashed to fixed-size digests first.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let a = Sha256::digest(a);
    let b = Sha256::digest(b);
    a.as_slice().ct_eq(b.as_slice()).into()
}
