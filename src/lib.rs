//! # relay-gateway
//!
//! Real-time WebSocket connection hub. Bots and clients hold a persistent
//! socket, authenticate once with an API token, and then receive live
//! events routed to them by the hub.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS Handler / ClientSession (ws/)
//!     ├── REST Handlers (api/)  ── GitHub translator (notify/)
//!     │
//!     ├── Hub control loop (hub/)
//!     │     ├── BroadcastRouter (domain/)
//!     │     └── per-session OutboundQueue
//!     │
//!     ├── ChannelRateLimiter (domain/)
//!     ├── IdentityVerifier (auth/)
//!     │
//!     └── PostgreSQL credential lookup (persistence/)
//! ```
//!
//! All registry mutation goes through one ordered command queue consumed
//! by a single task; sessions and REST handlers only hold a cloneable
//! [`hub::HubHandle`].

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod notify;
pub mod persistence;
pub mod ws;
