//! HTTP route handlers for the wallet web service.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                                              - Liveness
//! GET    /health/ready                                        - Readiness (store reachable)
//!
//! # Web service protocol (ApplePass auth)
//! POST   /v1/devices/{deviceId}/registrations/{passType}/{serial} - Register device
//! DELETE /v1/devices/{deviceId}/registrations/{passType}/{serial} - Unregister device
//! GET    /v1/devices/{deviceId}/registrations/{passType}          - Changed serials
//! GET    /v1/passes/{passType}/{serial}                           - Latest pass file
//!
//! # Pass administration (ApplePass auth)
//! POST   /v1/passes                                           - Create or replace
//! PUT    /v1/passes/{passType}/{serial}                       - Deep-merge update
//!
//! # Diagnostics (no auth)
//! POST   /v1/log                                              - Device log upload
//! ```

pub mod health;
pub mod log;
pub mod passes;
pub mod registrations;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::{device_log_rate_limiter, request_id_middleware};
use crate::state::AppState;

/// Create the authenticated protocol and administration routes.
pub fn protocol_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/devices/{device_id}/registrations/{pass_type}/{serial}",
            post(registrations::register).delete(registrations::unregister),
        )
        .route(
            "/devices/{device_id}/registrations/{pass_type}",
            get(registrations::list_updated),
        )
        .route("/passes", post(passes::create))
        .route(
            "/passes/{pass_type}/{serial}",
            get(passes::fetch).put(passes::update),
        )
}

/// Create the unauthenticated device log route.
pub fn device_log_routes() -> Router<AppState> {
    Router::new().route("/log", post(log::upload))
}

/// Build the full application without rate limiting.
///
/// Used by tests and anywhere the peer address is not available.
pub fn router(state: AppState) -> Router {
    assemble(state, device_log_routes())
}

/// Build the full application with the device log endpoint rate limited.
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// so the limiter can fall back to the peer address.
pub fn rate_limited_router(state: AppState) -> Router {
    assemble(state, device_log_routes().layer(device_log_rate_limiter()))
}

fn assemble(state: AppState, log_routes: Router<AppState>) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/v1", protocol_routes().merge(log_routes))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::db::{LogSink, MemoryStore};
    use crate::services::{
        LogPushSender, NotificationDispatcher, NotificationOutbox, RetryPolicy,
        UnsignedPassGenerator,
    };
    use crate::state::AppComponents;

    const TOKEN: &str = "tK9$vQ2!mZ7@pL4#";

    fn app(store: &MemoryStore) -> Router {
        let dispatcher = NotificationDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(LogPushSender),
            Duration::from_secs(1),
        );
        let (outbox, _worker) = NotificationOutbox::start(dispatcher, RetryPolicy::default(), 16);
        router(AppState::new(AppComponents {
            auth_token: SecretString::from(TOKEN),
            passes: Arc::new(store.clone()),
            registrations: Arc::new(store.clone()),
            device_logs: Arc::new(store.clone()),
            generator: Arc::new(UnsignedPassGenerator),
            outbox,
        }))
    }

    fn authed(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("ApplePass {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_readiness_with_memory_store() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_scheme_is_unauthorized() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(
                Request::get("/v1/devices/d1/registrations/pass.t")
                    .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_with_bad_token_is_bad_request() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(authed(
                "POST",
                "/v1/devices/d1/registrations/pass.t/s1",
                &format!(r#"{{"pushToken":"{}"}}"#, "g".repeat(64)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.registration_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_with_malformed_body_is_bad_request() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(authed(
                "POST",
                "/v1/devices/d1/registrations/pass.t/s1",
                "{not json",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_log_upload_needs_no_auth() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(
                Request::post("/v1/log")
                    .body(Body::from(r#"{"logs":["oops"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let logs = store.recent(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "oops");
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let store = MemoryStore::new();
        let response = app(&store)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key("x-request-id"));
    }
}
