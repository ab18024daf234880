//! Persistence for the wallet web service.
//!
//! # Database: `wallet` schema
//!
//! ## Tables
//!
//! - `passes` - Pass definitions and their logical version
//! - `registrations` - Device subscriptions with push tokens
//! - `device_logs` - Append-only diagnostic events reported by devices
//! - `version_clock` - Single row holding the newest pass version issued
//!
//! # Stores
//!
//! Each table sits behind a trait so handlers and services never depend on
//! the backend. Two backends exist:
//!
//! - Postgres repositories ([`PassRepository`], [`RegistrationRepository`],
//!   [`DeviceLogRepository`])
//! - [`MemoryStore`], one struct implementing all three traits, for tests and
//!   local runs without a database
//!
//! Every mutation is atomic per natural key: Postgres uses
//! `INSERT ... ON CONFLICT DO UPDATE` or a row lock, the memory store holds its
//! write lock across the whole read-modify-write.
//!
//! Pass versions come from one clock shared by all passes, so a version issued
//! later is always greater than any `lastUpdated` tag handed out earlier.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p wallet-cli -- migrate
//! ```

pub mod device_logs;
pub mod memory;
pub mod passes;
pub mod registrations;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use wallet_core::{PassKey, PushTokenError, UnixTime};

use crate::models::{
    ChangedSerials, DeviceLog, NewDeviceLog, NewPass, Pass, Registration, UpsertedRegistration,
};

pub use device_logs::DeviceLogRepository;
pub use memory::MemoryStore;
pub use passes::PassRepository;
pub use registrations::RegistrationRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Push token failed format validation.
    #[error("invalid push token: {0}")]
    InvalidToken(#[from] PushTokenError),
}

/// Storage for pass definitions.
#[async_trait]
pub trait PassStore: Send + Sync {
    /// Insert or fully replace the pass at `new.key`, advancing its version.
    async fn create_or_replace(&self, new: NewPass) -> Result<Pass, RepositoryError>;

    /// Deep-merge `partial` into the stored data, advancing the version.
    ///
    /// Returns `RepositoryError::NotFound` if the pass does not exist.
    async fn merge_update(&self, key: &PassKey, partial: Value) -> Result<Pass, RepositoryError>;

    /// Load a pass. Returns `RepositoryError::NotFound` if absent.
    async fn get(&self, key: &PassKey) -> Result<Pass, RepositoryError>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), RepositoryError>;
}

/// Storage for device registrations and the change-detection join.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Register `device_id` for the pass at `key`, or refresh its push token.
    ///
    /// Returns `RepositoryError::InvalidToken` if `push_token` is not 64 hex
    /// characters.
    async fn upsert(
        &self,
        device_id: &str,
        key: &PassKey,
        push_token: &str,
    ) -> Result<UpsertedRegistration, RepositoryError>;

    /// Remove a registration. Absence is not an error.
    async fn remove(&self, device_id: &str, key: &PassKey) -> Result<(), RepositoryError>;

    /// All registrations for one pass.
    async fn list_by_pass(&self, key: &PassKey) -> Result<Vec<Registration>, RepositoryError>;

    /// Serials registered by `device_id` under `pass_type_identifier` whose
    /// pass version is strictly newer than `since`.
    async fn list_changed_serials(
        &self,
        device_id: &str,
        pass_type_identifier: &str,
        since: UnixTime,
    ) -> Result<ChangedSerials, RepositoryError>;

    /// Record a successful wake-up.
    async fn mark_notified(
        &self,
        device_id: &str,
        key: &PassKey,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), RepositoryError>;
}

/// Append-only sink for device diagnostics.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: NewDeviceLog) -> Result<DeviceLog, RepositoryError>;

    /// Newest entries first.
    async fn recent(&self, limit: i64) -> Result<Vec<DeviceLog>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
