//! Persistence layer: PostgreSQL-backed credential lookup.
//!
//! The hub keeps no durable state of its own. The only database access is
//! reading the API tokens that handshakes are verified against.

pub mod postgres;

pub use postgres::PostgresCredentialStore;
