//! REST API layer: route handlers, DTOs, OpenAPI document, and the
//! assembled application router.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "relay-gateway",
        description = "WebSocket connection hub for bots and clients, plus its REST surface."
    ),
    paths(
        handlers::system::ping_handler,
        handlers::system::stats_handler,
        handlers::webhook::github_webhook,
    ),
    components(schemas(
        dto::ApiResponse,
        dto::GithubWebhook,
        crate::notify::Notification,
    )),
    tags(
        (name = "System", description = "Liveness and diagnostics"),
        (name = "Webhooks", description = "Inbound integrations relayed to sessions"),
    )
)]
pub struct ApiDoc;

#[cfg(not(feature = "swagger-ui"))]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}

/// Builds the REST router plus the OpenAPI document route.
pub fn build_router() -> Router<AppState> {
    let router = Router::new().merge(handlers::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()),
    );
    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route("/openapi.json", get(openapi_json));

    router
}

/// Assembles the full application: REST routes, `/ws`, 404 fallback and
/// the HTTP middleware stack.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    build_router()
        .route("/ws", get(ws_handler))
        .fallback(handlers::system::not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, Response};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{IdentityVerifier, SIGNATURE_HEADER, StaticCredentialStore, sign};
    use crate::domain::{ChannelRateLimiter, Credential, RateLimitConfig};
    use crate::hub::{HubConfig, HubHandle};
    use crate::notify::HubNotificationSink;
    use crate::notify::github::EVENT_HEADER;
    use crate::ws::SessionConfig;

    const SECRET: &str = "webhook-secret";

    fn app(secret: Option<&str>) -> Router {
        let (hub, _task) = HubHandle::spawn(HubConfig::default(), None);
        let state = AppState {
            verifier: IdentityVerifier::new(Arc::new(StaticCredentialStore::new())),
            limiter: Arc::new(ChannelRateLimiter::new(RateLimitConfig::default())),
            session_config: SessionConfig::default(),
            webhook_secret: secret.map(Credential::new),
            sink: Arc::new(HubNotificationSink::new(hub.clone())),
            hub,
        };
        build_app(state, Duration::from_secs(5))
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let Ok(resp): Result<Response<Body>, _> = app.oneshot(req).await else {
            panic!("router failed");
        };
        let status = resp.status();
        let Ok(bytes) = axum::body::to_bytes(resp.into_body(), usize::MAX).await else {
            panic!("body");
        };
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        let Ok(value) = serde_json::from_slice(bytes) else {
            panic!("expected JSON, got {}", String::from_utf8_lossy(bytes));
        };
        value
    }

    fn get_req(uri: &str) -> Request<Body> {
        let Ok(req) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("request");
        };
        req
    }

    fn github_req(body: &str, signature: Option<String>, event: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/github")
            .header(EVENT_HEADER, event);
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let Ok(req) = builder.body(Body::from(body.to_owned())) else {
            panic!("request");
        };
        req
    }

    fn signed(body: &str) -> Option<String> {
        Some(sign(SECRET.as_bytes(), body.as_bytes()))
    }

    #[tokio::test]
    async fn ping_returns_done_envelope() {
        let (status, body) = call(app(None), get_req("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"done": true, "reason": null}));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found_envelope() {
        let (status, body) = call(app(None), get_req("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body), serde_json::json!({"done": false, "reason": "Not Found"}));
    }

    #[tokio::test]
    async fn stats_is_plain_text() {
        let (status, body) = call(app(None), get_req("/__stats")).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("Websocket server stats:"));
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let (status, body) = call(app(None), get_req("/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        let doc = json(&body);
        assert!(doc["paths"]["/ping"].is_object());
        assert!(doc["paths"]["/github"].is_object());
    }

    #[tokio::test]
    async fn webhook_without_secret_is_disabled() {
        let body = r#"{"action": "created"}"#;
        let (status, _) = call(app(None), github_req(body, signed(body), "star")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature_before_parsing() {
        let (status, body) = call(
            app(Some(SECRET)),
            github_req("not json", Some("sha256=00".into()), "push"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["reason"], "Invalid signature");

        let (status, _) = call(app(Some(SECRET)), github_req("{}", None, "push")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_empty_body_requires_body() {
        let (status, body) = call(app(Some(SECRET)), github_req("", signed(""), "push")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(&body)["reason"], "Request body required");
    }

    #[tokio::test]
    async fn webhook_malformed_payload_is_unprocessable() {
        let body = "{not json";
        let (status, resp) = call(app(Some(SECRET)), github_req(body, signed(body), "push")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(&resp)["done"], false);
    }

    #[tokio::test]
    async fn webhook_valid_event_is_relayed() {
        let body = r#"{"action": "created", "repository": {"full_name": "a/b"}, "sender": {"login": "octo"}}"#;
        let (status, resp) = call(app(Some(SECRET)), github_req(body, signed(body), "star")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&resp)["done"], true);
    }
}
