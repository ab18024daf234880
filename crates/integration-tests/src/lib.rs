//! End-to-end test harness for the wallet web service.
//!
//! [`TestApp`] assembles the real router over in-memory stores, a recording
//! push sender and the unsigned pass generator. Requests go through
//! `tower::ServiceExt::oneshot`, so no socket is opened.
//!
//! Notifications run on the background outbox. Call [`TestApp::drain`] to
//! shut the router down and wait until every queued broadcast has finished
//! before asserting on push attempts.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use wallet_core::PushToken;
use wallet_server::db::MemoryStore;
use wallet_server::routes;
use wallet_server::services::{
    NotificationDispatcher, NotificationOutbox, PushError, PushSender, RetryPolicy,
    UnsignedPassGenerator,
};
use wallet_server::state::{AppComponents, AppState};

/// Token the harness configures and sends in `Authorization: ApplePass`.
pub const AUTH_TOKEN: &str = "Zq8!rW3@kT6#vN1$";

/// Pass type identifier used throughout the tests.
pub const PASS_TYPE: &str = "pass.com.example.ticket";

/// A valid push token made of one repeated hex digit.
#[must_use]
pub fn push_token(digit: char) -> String {
    digit.to_string().repeat(PushToken::LENGTH)
}

/// One wake-up the recording sender saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAttempt {
    pub push_token: String,
    pub topic: String,
    pub delivered: bool,
}

/// Push sender that records every attempt and fails chosen tokens.
#[derive(Debug, Default)]
pub struct RecordingPushSender {
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<PushAttempt>>,
}

impl RecordingPushSender {
    /// Make every send to `push_token` fail.
    pub fn fail_token(&self, push_token: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(push_token.to_ascii_lowercase());
    }

    /// All attempts so far, in send order.
    #[must_use]
    pub fn attempts(&self) -> Vec<PushAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send_wakeup(
        &self,
        push_token: &PushToken,
        pass_type_identifier: &str,
    ) -> Result<(), PushError> {
        let fails = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&push_token.as_str().to_ascii_lowercase());

        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PushAttempt {
                push_token: push_token.as_str().to_string(),
                topic: pass_type_identifier.to_string(),
                delivered: !fails,
            });

        if fails {
            Err(PushError::Rejected {
                status: 410,
                message: "Unregistered".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Parse the body as JSON. Panics if it is not.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("response body is not JSON ({e}): {:?}", self.body))
    }
}

/// The application under test plus handles to its collaborators.
pub struct TestApp {
    router: Option<Router>,
    worker: Option<JoinHandle<()>>,
    pub store: MemoryStore,
    pub push: Arc<RecordingPushSender>,
}

impl TestApp {
    /// Build a fresh application with empty stores.
    ///
    /// Must be called inside a Tokio runtime (the outbox worker is spawned).
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let push = Arc::new(RecordingPushSender::default());

        let dispatcher = NotificationDispatcher::new(
            Arc::new(store.clone()),
            push.clone(),
            Duration::from_secs(2),
        );
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
        };
        let (outbox, worker) = NotificationOutbox::start(dispatcher, policy, 64);

        let state = AppState::new(AppComponents {
            auth_token: SecretString::from(AUTH_TOKEN),
            passes: Arc::new(store.clone()),
            registrations: Arc::new(store.clone()),
            device_logs: Arc::new(store.clone()),
            generator: Arc::new(UnsignedPassGenerator),
            outbox,
        });

        Self {
            router: Some(routes::router(state)),
            worker: Some(worker),
            store,
            push,
        }
    }

    /// Send a request. `auth` adds the `ApplePass` header.
    ///
    /// # Panics
    ///
    /// Panics if called after [`TestApp::drain`] or if the router fails.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        auth: bool,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if auth {
            builder = builder.header(header::AUTHORIZATION, format!("ApplePass {AUTH_TOKEN}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let router = self
            .router
            .clone()
            .unwrap_or_else(|| panic!("request sent after drain"));
        let request = builder
            .body(body)
            .unwrap_or_else(|e| panic!("invalid test request: {e}"));
        let response = router
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("failed to read body: {e}"));

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// `POST /v1/devices/{device}/registrations/{type}/{serial}`.
    pub async fn register(&self, device: &str, serial: &str, token: &str) -> TestResponse {
        self.send(
            Method::POST,
            &format!("/v1/devices/{device}/registrations/{PASS_TYPE}/{serial}"),
            true,
            &[],
            Some(serde_json::json!({ "pushToken": token })),
        )
        .await
    }

    /// `DELETE /v1/devices/{device}/registrations/{type}/{serial}`.
    pub async fn unregister(&self, device: &str, serial: &str) -> TestResponse {
        self.send(
            Method::DELETE,
            &format!("/v1/devices/{device}/registrations/{PASS_TYPE}/{serial}"),
            true,
            &[],
            None,
        )
        .await
    }

    /// `GET /v1/devices/{device}/registrations/{type}?lastUpdated={since}`.
    pub async fn list_updated(&self, device: &str, since: Option<&str>) -> TestResponse {
        let query = since.map_or_else(String::new, |s| format!("?lastUpdated={s}"));
        self.send(
            Method::GET,
            &format!("/v1/devices/{device}/registrations/{PASS_TYPE}{query}"),
            true,
            &[],
            None,
        )
        .await
    }

    /// `POST /v1/passes`.
    pub async fn create_pass(&self, serial: &str, data: Value) -> TestResponse {
        self.send(
            Method::POST,
            "/v1/passes",
            true,
            &[],
            Some(serde_json::json!({
                "pass_type_identifier": PASS_TYPE,
                "serial_number": serial,
                "template_type": "eventTicket",
                "data": data,
            })),
        )
        .await
    }

    /// `PUT /v1/passes/{type}/{serial}`.
    pub async fn update_pass(&self, serial: &str, data: Value) -> TestResponse {
        self.send(
            Method::PUT,
            &format!("/v1/passes/{PASS_TYPE}/{serial}"),
            true,
            &[],
            Some(serde_json::json!({ "data": data })),
        )
        .await
    }

    /// `GET /v1/passes/{type}/{serial}`.
    pub async fn fetch_pass(&self, serial: &str) -> TestResponse {
        self.send(
            Method::GET,
            &format!("/v1/passes/{PASS_TYPE}/{serial}"),
            true,
            &[],
            None,
        )
        .await
    }

    /// Stop accepting requests and wait for every queued notification.
    ///
    /// # Panics
    ///
    /// Panics if the outbox worker panicked or does not finish in time.
    pub async fn drain(&mut self) {
        self.router.take();
        if let Some(worker) = self.worker.take() {
            tokio::time::timeout(Duration::from_secs(10), worker)
                .await
                .unwrap_or_else(|_| panic!("outbox did not drain in time"))
                .unwrap_or_else(|e| panic!("outbox worker failed: {e}"));
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
