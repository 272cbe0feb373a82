//! Inbound GitHub webhook.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;

use crate::api::dto::{ApiResponse, GithubWebhook};
use crate::app_state::AppState;
use crate::auth::{SIGNATURE_HEADER, verify_signature};
use crate::error::GatewayError;
use crate::notify::github::{EVENT_HEADER, GithubEventKind, translate};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `POST /github`: Relay a GitHub event to `send_all` sessions.
///
/// The signature is checked over the raw body before anything is parsed.
///
/// # Errors
///
/// - [`GatewayError::WebhookDisabled`] when no secret is configured.
/// - [`GatewayError::InvalidSignature`] on a missing or wrong signature.
/// - [`GatewayError::BodyRequired`] / [`GatewayError::InvalidRequest`] on
///   an empty or malformed payload.
/// - [`GatewayError::NotificationFailed`] if the sink refuses it.
#[utoipa::path(
    post,
    path = "/github",
    tag = "Webhooks",
    summary = "GitHub webhook",
    description = "Verifies `X-Hub-Signature-256` over the raw body, formats the event named by `X-GitHub-Event` and broadcasts it to sessions with `send_all` set.",
    request_body = GithubWebhook,
    params(
        ("X-Hub-Signature-256" = String, Header, description = "`sha256=<hex HMAC of the body>`"),
        ("X-GitHub-Event" = String, Header, description = "Event kind"),
    ),
    responses(
        (status = 200, description = "Event relayed", body = ApiResponse),
        (status = 400, description = "Notification could not be sent", body = ApiResponse),
        (status = 401, description = "Invalid signature", body = ApiResponse),
        (status = 422, description = "Empty or malformed payload", body = ApiResponse),
        (status = 503, description = "Webhook not configured", body = ApiResponse),
    )
)]
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse, GatewayError> {
    let Some(secret) = state.webhook_secret.as_ref() else {
        return Err(GatewayError::WebhookDisabled);
    };
    if !verify_signature(secret.expose(), &body, header(&headers, SIGNATURE_HEADER)) {
        tracing::warn!(bytes = body.len(), "github webhook signature mismatch");
        return Err(GatewayError::InvalidSignature);
    }
    if body.is_empty() {
        return Err(GatewayError::BodyRequired);
    }

    let hook: GithubWebhook = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    let kind = GithubEventKind::from_header(header(&headers, EVENT_HEADER));
    let notification = translate(&kind, &hook);
    state.sink.send(notification).await?;

    tracing::info!(event = %kind, repository = %hook.repository.full_name, "github webhook relayed");
    Ok(ApiResponse::ok())
}

/// Webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/github", post(github_webhook))
}
