//! REST endpoint handlers organized by concern.

pub mod system;
pub mod webhook;

use axum::Router;

use crate::app_state::AppState;

/// Composes all REST routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::routes())
        .merge(webhook::routes())
}
