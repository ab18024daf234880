//! Wallet web service binary.
//!
//! Serves the `PassKit` web service protocol on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out, pass files as binary bodies
//! - `PostgreSQL` (or in-memory) stores behind traits
//! - Background outbox that fans out push wake-ups after pass changes
//! - External push relay and pass signer reached over HTTP

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sentry::integrations::tracing as sentry_tracing;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_server::config::{Storage, WalletConfig};
use wallet_server::db::{
    self, DeviceLogRepository, LogSink, MemoryStore, PassRepository, PassStore,
    RegistrationRepository, RegistrationStore,
};
use wallet_server::routes;
use wallet_server::services::{
    CachedPassGenerator, NotificationDispatcher, NotificationOutbox, PassGenerator,
    RemotePassGenerator, RetryPolicy, UnsignedPassGenerator, sender_for,
};
use wallet_server::state::{AppComponents, AppState};

/// How long the outbox may keep delivering after the server stops.
const OUTBOX_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &WalletConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// The three stores, backed by the configured storage.
struct Stores {
    passes: Arc<dyn PassStore>,
    registrations: Arc<dyn RegistrationStore>,
    device_logs: Arc<dyn LogSink>,
}

async fn open_stores(storage: &Storage) -> Stores {
    match storage {
        Storage::Postgres { database_url } => {
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");

            // NOTE: Migrations are NOT run automatically on startup.
            // Run them explicitly via: cargo run -p wallet-cli -- migrate

            Stores {
                passes: Arc::new(PassRepository::new(pool.clone())),
                registrations: Arc::new(RegistrationRepository::new(pool.clone())),
                device_logs: Arc::new(DeviceLogRepository::new(pool)),
            }
        }
        Storage::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            let store = MemoryStore::new();
            Stores {
                passes: Arc::new(store.clone()),
                registrations: Arc::new(store.clone()),
                device_logs: Arc::new(store),
            }
        }
    }
}

fn pass_generator(config: &WalletConfig) -> Arc<dyn PassGenerator> {
    let inner: Arc<dyn PassGenerator> = match &config.signer_url {
        Some(url) => {
            tracing::info!(url = %url, "Pass signer configured");
            Arc::new(RemotePassGenerator::new(url.clone()))
        }
        None => {
            tracing::warn!("WALLET_SIGNER_URL not set, serving unsigned pass.json");
            Arc::new(UnsignedPassGenerator)
        }
    };
    Arc::new(CachedPassGenerator::new(inner))
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = WalletConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wallet_server=info,tower_http=debug".into());

    // Use JSON format on Fly.io for structured log parsing, text format locally
    let is_fly = std::env::var("FLY_APP_NAME").is_ok();
    let json_layer = is_fly.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_fly).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let stores = open_stores(&config.storage).await;

    let dispatcher = NotificationDispatcher::new(
        stores.registrations.clone(),
        sender_for(config.notify.relay.as_ref()),
        config.notify.send_timeout,
    );
    let policy = RetryPolicy {
        max_attempts: config.notify.max_attempts,
        ..RetryPolicy::default()
    };
    let (outbox, outbox_worker) =
        NotificationOutbox::start(dispatcher, policy, config.notify.queue_capacity);

    let state = AppState::new(AppComponents {
        auth_token: config.auth_token.clone(),
        passes: stores.passes,
        registrations: stores.registrations,
        device_logs: stores.device_logs,
        generator: pass_generator(&config),
        outbox,
    });

    let app = routes::rate_limited_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record("latency_ms", latency.as_millis() as u64);
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("wallet-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // The router (and with it the last outbox handle) is gone; let queued
    // notifications finish.
    match tokio::time::timeout(OUTBOX_DRAIN_TIMEOUT, outbox_worker).await {
        Ok(Ok(())) => tracing::info!("Notification outbox drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Notification worker failed"),
        Err(_) => tracing::warn!("Timed out draining notification outbox"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
