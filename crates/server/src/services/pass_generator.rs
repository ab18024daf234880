//! Pass file generation.
//!
//! Building and signing the `.pkpass` archive is delegated to an external
//! signing service. This module only defines the seam and two backends:
//!
//! - [`RemotePassGenerator`] posts the pass to the signing service
//! - [`UnsignedPassGenerator`] emits the bare `pass.json` for local runs
//!
//! [`CachedPassGenerator`] wraps either backend with a `moka` cache keyed by
//! pass version, so a device polling an unchanged pass does not trigger a new
//! signing round-trip.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use wallet_core::{PassKey, UnixTime};

use crate::models::Pass;

/// Errors that can occur while generating a pass file.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// HTTP request to the signing service failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Signing service returned an error response.
    #[error("signer error: {status} - {message}")]
    Signer { status: u16, message: String },

    /// Pass data could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Cached generation failed in another request.
    #[error("generation failed: {0}")]
    Shared(Arc<GenerateError>),
}

/// Turns a stored pass into the binary served to devices.
#[async_trait]
pub trait PassGenerator: Send + Sync {
    /// Render `pass` to a `.pkpass` (or equivalent) blob.
    async fn generate(&self, pass: &Pass) -> Result<Bytes, GenerateError>;
}

/// Pass identity and payload handed to a generator backend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassDocument<'a> {
    pass_type_identifier: &'a str,
    serial_number: &'a str,
    template_type: &'a str,
    data: &'a Value,
}

impl<'a> From<&'a Pass> for PassDocument<'a> {
    fn from(pass: &'a Pass) -> Self {
        Self {
            pass_type_identifier: &pass.pass_type_identifier,
            serial_number: &pass.serial_number,
            template_type: &pass.template_type,
            data: &pass.data,
        }
    }
}

/// Generator backed by an external signing service.
#[derive(Debug, Clone)]
pub struct RemotePassGenerator {
    client: reqwest::Client,
    endpoint: Url,
}

impl RemotePassGenerator {
    /// Create a generator that posts to `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl PassGenerator for RemotePassGenerator {
    #[instrument(skip(self, pass), fields(pass = %pass.key()))]
    async fn generate(&self, pass: &Pass) -> Result<Bytes, GenerateError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&PassDocument::from(pass))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerateError::Signer {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?)
    }
}

/// Generator that returns the unsigned `pass.json` document.
///
/// Wallet will not import these; they exist so the protocol can be exercised
/// without a signing service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsignedPassGenerator;

#[async_trait]
impl PassGenerator for UnsignedPassGenerator {
    async fn generate(&self, pass: &Pass) -> Result<Bytes, GenerateError> {
        let json = serde_json::to_vec(&PassDocument::from(pass))?;
        Ok(Bytes::from(json))
    }
}

/// Caching decorator around another generator.
#[derive(Clone)]
pub struct CachedPassGenerator {
    inner: Arc<dyn PassGenerator>,
    cache: Cache<(PassKey, UnixTime), Bytes>,
}

impl CachedPassGenerator {
    /// Wrap `inner` with a cache of up to 500 rendered passes (10 minute TTL).
    #[must_use]
    pub fn new(inner: Arc<dyn PassGenerator>) -> Self {
        let cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(Duration::from_secs(600))
            .build();

        Self { inner, cache }
    }
}

#[async_trait]
impl PassGenerator for CachedPassGenerator {
    async fn generate(&self, pass: &Pass) -> Result<Bytes, GenerateError> {
        // The version is part of the key, so an update never serves stale bytes
        let key = (pass.key(), pass.version_updated_at);

        self.cache
            .try_get_with(key, async {
                debug!(pass = %pass.key(), "Rendering pass (cache miss)");
                self.inner.generate(pass).await
            })
            .await
            .map_err(GenerateError::Shared)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use serde_json::json;
    use wallet_core::PassRecordId;

    use super::*;

    fn pass(version: i64) -> Pass {
        Pass {
            id: PassRecordId::new(1),
            pass_type_identifier: "pass.t".into(),
            serial_number: "s1".into(),
            template_type: "generic".into(),
            data: json!({"description": "x"}),
            version_updated_at: UnixTime::from_secs(version),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PassGenerator for CountingGenerator {
        async fn generate(&self, pass: &Pass) -> Result<Bytes, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(pass.version_updated_at.to_string()))
        }
    }

    #[tokio::test]
    async fn test_unsigned_generator_emits_pass_json() {
        let bytes = UnsignedPassGenerator.generate(&pass(1)).await.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["passTypeIdentifier"], "pass.t");
        assert_eq!(doc["serialNumber"], "s1");
        assert_eq!(doc["data"]["description"], "x");
    }

    #[tokio::test]
    async fn test_cache_reuses_same_version() {
        let counting = Arc::new(CountingGenerator::default());
        let cached = CachedPassGenerator::new(counting.clone());

        cached.generate(&pass(1)).await.unwrap();
        cached.generate(&pass(1)).await.unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_misses_on_new_version() {
        let counting = Arc::new(CountingGenerator::default());
        let cached = CachedPassGenerator::new(counting.clone());

        let first = cached.generate(&pass(1)).await.unwrap();
        let second = cached.generate(&pass(2)).await.unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
        assert_ne!(first, second);
    }
}
