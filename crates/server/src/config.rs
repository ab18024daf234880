//! Wallet web service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `WALLET_AUTH_TOKEN` - Shared `ApplePass` authentication token (high entropy)
//! - `WALLET_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed when `WALLET_STORAGE=memory`)
//!
//! ## Optional
//! - `WALLET_HOST` - Bind address (default: 127.0.0.1)
//! - `WALLET_PORT` - Listen port (default: 3000)
//! - `WALLET_STORAGE` - `postgres` or `memory` (default: postgres)
//! - `WALLET_PUSH_RELAY_URL` - Push relay endpoint; wake-ups are only logged when unset
//! - `WALLET_PUSH_RELAY_TOKEN` - Bearer token for the push relay
//! - `WALLET_PUSH_TIMEOUT_SECS` - Per-device send timeout (default: 10)
//! - `WALLET_NOTIFY_MAX_ATTEMPTS` - Broadcast attempts per task (default: 3)
//! - `WALLET_NOTIFY_QUEUE_CAPACITY` - Outbox queue size (default: 1024)
//! - `WALLET_SIGNER_URL` - Pass signing service; passes are served unsigned when unset
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_AUTH_TOKEN_LENGTH: usize = 16;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where passes, registrations and device logs are kept.
#[derive(Debug, Clone)]
pub enum Storage {
    /// `PostgreSQL` (connection URL contains a password).
    Postgres { database_url: SecretString },
    /// Process memory; everything is lost on restart.
    Memory,
}

/// Push relay settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct PushRelayConfig {
    /// Relay endpoint receiving `{pushToken, topic}` posts
    pub url: Url,
    /// Optional bearer token for the relay
    pub token: Option<SecretString>,
}

impl std::fmt::Debug for PushRelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushRelayConfig")
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Outbound notification settings.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Relay to hand wake-ups to; `None` logs them instead
    pub relay: Option<PushRelayConfig>,
    /// Budget for a single device send
    pub send_timeout: Duration,
    /// Broadcast attempts per outbox task
    pub max_attempts: u32,
    /// Bounded outbox size
    pub queue_capacity: usize,
}

/// Wallet web service configuration.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Storage backend
    pub storage: Storage,
    /// Shared token expected in `Authorization: ApplePass <token>`
    pub auth_token: SecretString,
    /// Push and outbox settings
    pub notify: NotifyConfig,
    /// Pass signing service; `None` serves unsigned `pass.json`
    pub signer_url: Option<Url>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

impl WalletConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the auth token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_parsed_env::<IpAddr>("WALLET_HOST", "127.0.0.1")?;
        let port = get_parsed_env::<u16>("WALLET_PORT", "3000")?;
        let storage = Storage::from_env()?;
        let auth_token = get_validated_secret("WALLET_AUTH_TOKEN")?;
        let notify = NotifyConfig::from_env()?;
        let signer_url = get_optional_url("WALLET_SIGNER_URL")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            host,
            port,
            storage,
            auth_token,
            notify,
            signer_url,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Storage {
    fn from_env() -> Result<Self, ConfigError> {
        match get_env_or_default("WALLET_STORAGE", "postgres").as_str() {
            "postgres" => Ok(Self::Postgres {
                database_url: get_database_url("WALLET_DATABASE_URL")?,
            }),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidEnvVar(
                "WALLET_STORAGE".to_string(),
                format!("expected 'postgres' or 'memory', got '{other}'"),
            )),
        }
    }
}

impl NotifyConfig {
    /// Load the push and outbox settings on their own.
    ///
    /// The operator CLI uses this so it sends wake-ups exactly as the
    /// server would.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay URL is not http(s) or a numeric
    /// setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let relay = get_optional_url("WALLET_PUSH_RELAY_URL")?.map(|url| PushRelayConfig {
            url,
            token: get_optional_env("WALLET_PUSH_RELAY_TOKEN").map(SecretString::from),
        });

        Ok(Self {
            relay,
            send_timeout: Duration::from_secs(get_parsed_env("WALLET_PUSH_TIMEOUT_SECS", "10")?),
            max_attempts: get_parsed_env("WALLET_NOTIFY_MAX_ATTEMPTS", "3")?,
            queue_capacity: get_parsed_env("WALLET_NOTIFY_QUEUE_CAPACITY", "1024")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable parsed as `T`, falling back to `default`.
fn get_parsed_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get an optional URL, rejecting anything that is not http(s).
fn get_optional_url(key: &str) -> Result<Option<Url>, ConfigError> {
    get_optional_env(key)
        .map(|raw| parse_http_url(key, &raw))
        .transpose()
}

fn parse_http_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url: Url = parse_value(key, raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{scheme}'"),
        )),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is long enough, not a placeholder, and has
/// sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_AUTH_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {MIN_AUTH_TOKEN_LENGTH} characters (got {})",
                secret.len()
            ),
        ));
    }

    // Whitespace can never round-trip through the Authorization header
    if secret.chars().any(char::is_whitespace) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "must not contain whitespace".to_string(),
        ));
    }

    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
