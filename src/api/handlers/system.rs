//! System endpoints: liveness, hub diagnostics, unknown routes.

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::api::dto::ApiResponse;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// `GET /ping`: Liveness probe.
#[utoipa::path(
    get,
    path = "/ping",
    tag = "System",
    summary = "Liveness probe",
    description = "Always answers with a successful envelope.",
    responses(
        (status = 200, description = "Service is up", body = ApiResponse),
    )
)]
pub async fn ping_handler() -> ApiResponse {
    ApiResponse::ok()
}

/// `GET /__stats`: Plain-text dump of every live session and the hub
/// counters. Credentials are never included.
///
/// A connection that has not finished its handshake is listed as an
/// anonymous row (`ID: -`, `IdentityStatus: pending`) until it is either
/// verified or dropped. The id it claimed is never shown, so a rejected
/// identity does not appear even while its handshake is in flight.
#[utoipa::path(
    get,
    path = "/__stats",
    tag = "System",
    summary = "Hub diagnostics",
    description = "Per-session identity, status, role, rate-limit channel, routing flags and pump health, followed by hub totals. Connections still in their handshake appear as anonymous `pending` rows.",
    responses(
        (status = 200, description = "Diagnostics dump", body = String, content_type = "text/plain"),
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.hub.stats().render_text(),
    )
}

/// Fallback for unmatched routes.
pub async fn not_found() -> GatewayError {
    GatewayError::NotFound
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/__stats", get(stats_handler))
}
