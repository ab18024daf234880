//! Notification fan-out for a single pass.
//!
//! A broadcast wakes every device registered for a pass. Sends run
//! concurrently, each bounded by its own timeout, and one device failing
//! never stops delivery to the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use wallet_core::PassKey;

use crate::db::{RegistrationStore, RepositoryError};
use crate::models::Registration;
use crate::services::push::{PushError, PushSender};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Registrations a wake-up was sent to.
    pub attempted: usize,
    /// Sends that completed successfully.
    pub delivered: usize,
    /// Sends that failed or timed out.
    pub failed: usize,
}

impl BroadcastReport {
    /// A broadcast succeeds when nobody was registered or at least one
    /// device was reached.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.attempted == 0 || self.delivered > 0
    }
}

/// Sends wake-ups to every device registered for a pass.
#[derive(Clone)]
pub struct NotificationDispatcher {
    registrations: Arc<dyn RegistrationStore>,
    push: Arc<dyn PushSender>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        push: Arc<dyn PushSender>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registrations,
            push,
            send_timeout,
        }
    }

    /// Wake every device registered for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the registrations cannot be loaded.
    /// Individual send failures are counted in the report.
    #[instrument(skip(self), fields(pass = %key))]
    pub async fn broadcast(&self, key: &PassKey) -> Result<BroadcastReport, RepositoryError> {
        let registrations = self.registrations.list_by_pass(key).await?;

        if registrations.is_empty() {
            info!("No registered devices, nothing to notify");
            return Ok(BroadcastReport::default());
        }

        let results = join_all(registrations.iter().map(|r| self.send_one(r))).await;

        let mut report = BroadcastReport {
            attempted: results.len(),
            ..BroadcastReport::default()
        };
        for (registration, result) in registrations.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    if let Err(e) = self
                        .registrations
                        .mark_notified(&registration.device_library_identifier, key, Utc::now())
                        .await
                    {
                        warn!(
                            device = %registration.device_library_identifier,
                            error = %e,
                            "Failed to record notification time"
                        );
                    }
                }
                Err(_) => report.failed += 1,
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast finished"
        );

        Ok(report)
    }

    async fn send_one(&self, registration: &Registration) -> Result<(), PushError> {
        let send = self
            .push
            .send_wakeup(&registration.push_token, &registration.pass_type_identifier);

        let result = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout(self.send_timeout)),
        };

        match &result {
            Ok(()) => info!(
                device = %registration.device_library_identifier,
                token = %registration.push_token.redacted(),
                "Wake-up delivered"
            ),
            Err(e) => warn!(
                device = %registration.device_library_identifier,
                token = %registration.push_token.redacted(),
                error = %e,
                "Wake-up failed"
            ),
        }

        result
    }
}
