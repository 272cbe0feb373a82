//! The standard response envelope shared by every REST endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reason produced by body readers when the body is empty.
const EOF_REASON: &str = "EOF";

/// Replacement reason for empty-body errors.
pub const BODY_REQUIRED_REASON: &str = "Request body required";

/// Response envelope: `{done, reason, ctx?}`.
///
/// `reason` is always present (possibly `null`); `ctx` is omitted when
/// there is nothing to attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    /// Whether the request succeeded.
    pub done: bool,
    /// Failure reason, `null` on success.
    pub reason: Option<String>,
    /// Optional endpoint-specific context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx: Option<serde_json::Value>,
}

impl ApiResponse {
    /// A successful envelope with no reason and no context.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            done: true,
            reason: None,
            ctx: None,
        }
    }

    /// A successful envelope carrying `ctx`.
    #[must_use]
    pub const fn ok_with(ctx: serde_json::Value) -> Self {
        Self {
            done: true,
            reason: None,
            ctx: Some(ctx),
        }
    }

    /// A failed envelope. `"EOF"` is normalized to
    /// [`BODY_REQUIRED_REASON`] and an empty reason becomes `null`.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = match reason.as_str() {
            "" => None,
            EOF_REASON => Some(BODY_REQUIRED_REASON.to_string()),
            _ => Some(reason),
        };
        Self {
            done: false,
            reason,
            ctx: None,
        }
    }

    /// Renders the envelope as a JSON response with the given status.
    #[must_use]
    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        self.with_status(StatusCode::OK)
    }
}
