//! CLI subcommands and the environment they share.

pub mod logs;
pub mod migrate;
pub mod notify;
pub mod pass;

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use wallet_server::config::{ConfigError, NotifyConfig};
use wallet_server::db::{self, RegistrationRepository, RepositoryError};
use wallet_server::services::{NotificationDispatcher, sender_for};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pass file: {0}")]
    InvalidPass(String),

    #[error("Broadcast reached none of {0} registered devices")]
    BroadcastFailed(usize),
}

/// Connect to the database named by `WALLET_DATABASE_URL` (or `DATABASE_URL`).
pub async fn connect() -> Result<PgPool, CliError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("WALLET_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CliError::MissingEnvVar("WALLET_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}

/// Build a dispatcher from the same push settings the server uses.
pub fn dispatcher(pool: &PgPool) -> Result<NotificationDispatcher, CliError> {
    let notify = NotifyConfig::from_env()?;

    Ok(NotificationDispatcher::new(
        Arc::new(RegistrationRepository::new(pool.clone())),
        sender_for(notify.relay.as_ref()),
        notify.send_timeout,
    ))
}
