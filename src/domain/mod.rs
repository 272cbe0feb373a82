//! Domain layer: identities, routing policy, and rate limiting.
//!
//! Everything in here is transport-agnostic. The hub and the WebSocket
//! sessions build on these types; none of them perform I/O.

pub mod identity;
pub mod rate_limiter;
pub mod router;
pub mod session_id;

pub use identity::{Credential, IdentityStatus, Role, SessionIdentity, rate_limit_channel};
pub use rate_limiter::{ChannelRateLimiter, RateLimitConfig};
pub use router::{BroadcastMessage, RouteCandidate, Targeting, select_recipients};
pub use session_id::{ConnectionId, SessionId};
