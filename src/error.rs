//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the REST boundary. Each
//! variant maps to an HTTP status code and renders as the standard
//! [`ApiResponse`] envelope with `done: false`.
//!
//! Hub and session failures never surface here: they are scoped to the
//! affected connection and only logged (see [`crate::ws::SessionError`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::api::dto::ApiResponse;

/// Server-side error enum with HTTP status code mapping.
///
/// | Variant              | HTTP Status               |
/// |----------------------|---------------------------|
/// | `BodyRequired`       | 422 Unprocessable Entity  |
/// | `InvalidRequest`     | 422 Unprocessable Entity  |
/// | `InvalidSignature`   | 401 Unauthorized          |
/// | `NotFound`           | 404 Not Found             |
/// | `NotificationFailed` | 400 Bad Request           |
/// | `AtCapacity`         | 503 Service Unavailable   |
/// | `HubUnavailable`     | 503 Service Unavailable   |
/// | `WebhookDisabled`    | 503 Service Unavailable   |
/// | `CredentialLookup`   | 500 Internal Server Error |
/// | `Internal`           | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request had an empty body where one is required.
    #[error("Request body required")]
    BodyRequired,

    /// Request body could not be parsed or failed validation.
    #[error("{0}")]
    InvalidRequest(String),

    /// Webhook signature header missing or not matching the body.
    #[error("Invalid signature")]
    InvalidSignature,

    /// No route matched.
    #[error("Not Found")]
    NotFound,

    /// The outbound notification sink refused the message.
    #[error("Error sending message: {0}")]
    NotificationFailed(String),

    /// The hub is at its configured connection limit.
    #[error("connection limit reached, try again later")]
    AtCapacity,

    /// The hub control loop is no longer running.
    #[error("connection hub unavailable")]
    HubUnavailable,

    /// No webhook secret is configured, so no signature can be checked.
    #[error("webhook endpoint is not configured")]
    WebhookDisabled,

    /// Credential backend failure.
    #[error("credential lookup failed: {0}")]
    CredentialLookup(String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BodyRequired | Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotificationFailed(_) => StatusCode::BAD_REQUEST,
            Self::AtCapacity | Self::HubUnavailable | Self::WebhookDisabled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::CredentialLookup(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::CredentialLookup(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        ApiResponse::failure(self.to_string()).with_status(status)
    }
}
