//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};

use super::session::ClientSession;
use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::hub::Counter;

/// `GET /ws`: Upgrade HTTP connection to a hub session.
///
/// Refused with a 503 envelope when the hub is already full.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.hub.is_at_capacity() {
        state.hub.counters().incr(Counter::Refused);
        tracing::warn!(
            max = state.hub.max_connections(),
            "refusing websocket upgrade, hub at capacity"
        );
        return GatewayError::AtCapacity.into_response();
    }

    let session = ClientSession::new(
        state.hub.clone(),
        state.verifier.clone(),
        Arc::clone(&state.limiter),
        state.session_config,
    );
    ws.max_message_size(state.session_config.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let _ = session.run(socket).await;
        })
}
