//! Push wake-up delivery.
//!
//! `PassKit` updates are triggered by an empty APNs notification sent to the
//! device's push token with the pass type identifier as the topic. This
//! service does not speak APNs itself: [`RelayPushSender`] hands wake-ups to
//! a push relay over HTTP, and [`LogPushSender`] only records them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use wallet_core::PushToken;

use crate::config::PushRelayConfig;

/// Errors that can occur while sending a wake-up.
#[derive(Debug, Error)]
pub enum PushError {
    /// HTTP request to the relay failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Relay refused the notification.
    #[error("relay rejected wake-up: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The send did not complete within the per-send budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends a silent wake-up to one device.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Wake the device behind `push_token` for passes of `pass_type_identifier`.
    async fn send_wakeup(
        &self,
        push_token: &PushToken,
        pass_type_identifier: &str,
    ) -> Result<(), PushError>;
}

/// Body posted to the push relay.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayWakeup<'a> {
    push_token: &'a str,
    topic: &'a str,
}

/// Push sender that forwards wake-ups to an HTTP push relay.
///
/// Implements `Debug` manually to redact the relay token.
#[derive(Clone)]
pub struct RelayPushSender {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for RelayPushSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPushSender")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl RelayPushSender {
    /// Create a relay sender.
    #[must_use]
    pub fn new(endpoint: Url, token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            token,
        }
    }
}

#[async_trait]
impl PushSender for RelayPushSender {
    #[instrument(skip(self, push_token), fields(token = %push_token.redacted(), topic = %pass_type_identifier))]
    async fn send_wakeup(
        &self,
        push_token: &PushToken,
        pass_type_identifier: &str,
    ) -> Result<(), PushError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&RelayWakeup {
            push_token: push_token.as_str(),
            topic: pass_type_identifier,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(PushError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(status = status.as_u16(), "Wake-up accepted by relay");
        Ok(())
    }
}

/// Push sender that only logs. Used when no relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send_wakeup(
        &self,
        push_token: &PushToken,
        pass_type_identifier: &str,
    ) -> Result<(), PushError> {
        info!(
            token = %push_token.redacted(),
            topic = %pass_type_identifier,
            "Push relay not configured, wake-up logged only"
        );
        Ok(())
    }
}

/// Pick the sender for the configured relay, falling back to logging.
#[must_use]
pub fn sender_for(relay: Option<&PushRelayConfig>) -> Arc<dyn PushSender> {
    match relay {
        Some(relay) => {
            info!(url = %relay.url, "Push relay configured");
            Arc::new(RelayPushSender::new(relay.url.clone(), relay.token.clone()))
        }
        None => {
            warn!("WALLET_PUSH_RELAY_URL not set, wake-ups will only be logged");
            Arc::new(LogPushSender)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let token = PushToken::parse(&"c".repeat(64)).unwrap();
        assert!(LogPushSender.send_wakeup(&token, "pass.t").await.is_ok());
    }

    #[test]
    fn test_relay_debug_redacts_token() {
        let sender = RelayPushSender::new(
            Url::parse("https://relay.example.net/wake").unwrap(),
            Some(SecretString::from("very-secret")),
        );
        let debug = format!("{sender:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("very-secret"));
    }

    #[tokio::test]
    async fn test_sender_for_without_relay_only_logs() {
        let token = PushToken::parse(&"d".repeat(64)).unwrap();
        assert!(sender_for(None).send_wakeup(&token, "pass.t").await.is_ok());
    }

    #[test]
    fn test_timeout_reports_sub_second_budget() {
        let err = PushError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "timed out after 250ms");
    }

    #[test]
    fn test_relay_body_shape() {
        let body = serde_json::to_value(RelayWakeup {
            push_token: "abc",
            topic: "pass.t",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"pushToken": "abc", "topic": "pass.t"}));
    }
}
