//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;

use crate::db::{LogSink, PassStore, RegistrationStore};
use crate::services::{NotificationOutbox, PassGenerator};

/// Everything a running service needs, assembled by `main` or a test harness.
pub struct AppComponents {
    /// Shared token expected in `Authorization: ApplePass <token>`.
    pub auth_token: SecretString,
    pub passes: Arc<dyn PassStore>,
    pub registrations: Arc<dyn RegistrationStore>,
    pub device_logs: Arc<dyn LogSink>,
    pub generator: Arc<dyn PassGenerator>,
    pub outbox: NotificationOutbox,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// stores and services behind trait objects, so handlers never know which
/// backend is in use.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppComponents>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(components: AppComponents) -> Self {
        Self {
            inner: Arc::new(components),
        }
    }

    /// Get the configured `ApplePass` token.
    #[must_use]
    pub fn auth_token(&self) -> &SecretString {
        &self.inner.auth_token
    }

    /// Get the pass store.
    #[must_use]
    pub fn passes(&self) -> &dyn PassStore {
        self.inner.passes.as_ref()
    }

    /// Get the registration store.
    #[must_use]
    pub fn registrations(&self) -> &dyn RegistrationStore {
        self.inner.registrations.as_ref()
    }

    /// Get the device log sink.
    #[must_use]
    pub fn device_logs(&self) -> &dyn LogSink {
        self.inner.device_logs.as_ref()
    }

    /// Get the pass file generator.
    #[must_use]
    pub fn generator(&self) -> &dyn PassGenerator {
        self.inner.generator.as_ref()
    }

    /// Get the notification outbox.
    #[must_use]
    pub fn outbox(&self) -> &NotificationOutbox {
        &self.inner.outbox
    }
}
