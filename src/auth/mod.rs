//! Authentication: handshake identity verification and webhook signatures.

pub mod signature;
pub mod store;
pub mod verifier;

pub use signature::{SIGNATURE_HEADER, sign, verify_signature};
pub use store::{CredentialStore, StaticCredentialStore};
pub use verifier::IdentityVerifier;
