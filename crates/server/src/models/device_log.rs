//! Device diagnostic log types.

use chrono::{DateTime, Utc};
use serde_json::Value;

use wallet_core::{DeviceLogId, LogLevel};

/// An append-only diagnostic event.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeviceLog {
    pub id: DeviceLogId,
    /// Reporting device, when known.
    pub device_library_identifier: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub pass_type_identifier: Option<String>,
    pub serial_number: Option<String>,
    /// Free-form structured context supplied with the entry.
    pub context: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for `LogSink::append`.
#[derive(Debug, Clone)]
pub struct NewDeviceLog {
    pub device_library_identifier: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub pass_type_identifier: Option<String>,
    pub serial_number: Option<String>,
    pub context: Option<Value>,
}

impl NewDeviceLog {
    /// A device-reported error with no pass attached.
    #[must_use]
    pub fn error(device_library_identifier: Option<String>, message: impl Into<String>) -> Self {
        Self {
            device_library_identifier,
            level: LogLevel::Error,
            message: message.into(),
            pass_type_identifier: None,
            serial_number: None,
            context: None,
        }
    }
}
