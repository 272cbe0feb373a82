//! WebSocket layer: upgrade handler, per-connection sessions, wire frames.
//!
//! Each accepted socket becomes a [`ClientSession`] that registers with the
//! hub, performs the identity handshake and then pumps frames until either
//! side goes away.

pub mod handler;
pub mod messages;
pub mod outbound;
pub mod session;
pub mod state;

pub use session::{ClientSession, SessionConfig, SessionError};
pub use state::{Lifecycle, SessionState};
