//! Device log upload.
//!
//! `POST /v1/log` is unauthenticated and always answers 200. Devices report
//! problems here when something else failed, so a body that cannot be parsed
//! is still kept, verbatim, as a single error entry, and an item that does not
//! fit the expected shape is stored as its JSON text next to the others.

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use wallet_core::LogLevel;

use crate::models::NewDeviceLog;
use crate::state::AppState;

/// Longest message kept per entry, including a raw unparseable body.
const MAX_MESSAGE_LEN: usize = 4096;

/// Body of a log upload.
///
/// Items are kept as raw JSON so one odd item cannot sink the rest of the
/// batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUpload {
    #[serde(default)]
    pub device_library_identifier: Option<String>,
    #[serde(default)]
    pub logs: Vec<Value>,
}

/// A structured log item. Wallet itself sends plain strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogItem {
    message: String,
    #[serde(default)]
    pass_type_identifier: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

impl LogUpload {
    /// Turn the upload into error-level log entries, one per item.
    ///
    /// Strings become their text, objects with a `message` keep their pass
    /// and context, anything else is stored as its JSON text.
    #[must_use]
    pub fn into_entries(self) -> Vec<NewDeviceLog> {
        let device = self.device_library_identifier;
        self.logs
            .into_iter()
            .map(|item| entry_from_item(device.clone(), item))
            .collect()
    }
}

fn entry_from_item(device: Option<String>, item: Value) -> NewDeviceLog {
    if let Value::String(message) = item {
        return NewDeviceLog::error(device, truncate(&message));
    }

    match LogItem::deserialize(&item) {
        Ok(LogItem {
            message,
            pass_type_identifier,
            serial_number,
            context,
        }) => NewDeviceLog {
            device_library_identifier: device,
            level: LogLevel::Error,
            message: truncate(&message),
            pass_type_identifier,
            serial_number,
            context,
        },
        Err(_) => NewDeviceLog::error(device, truncate(&item.to_string())),
    }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_LEN).collect()
}

/// Parse an upload body, falling back to one entry holding the raw text.
#[must_use]
pub fn parse_upload(body: &[u8]) -> Vec<NewDeviceLog> {
    match serde_json::from_slice::<LogUpload>(body) {
        Ok(upload) => upload.into_entries(),
        Err(e) => {
            debug!(error = %e, "Unparseable device log upload, storing raw body");
            let raw = String::from_utf8_lossy(body);
            vec![NewDeviceLog::error(None, truncate(&raw))]
        }
    }
}

/// Accept a device log upload.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn upload(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let entries = parse_upload(&body);
    if entries.is_empty() {
        warn!("Device log upload contained no entries");
    }

    for entry in entries {
        if let Err(e) = state.device_logs().append(entry).await {
            error!(error = %e, "Failed to store device log entry");
        }
    }

    StatusCode::OK
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_string_logs() {
        let entries = parse_upload(br#"{"deviceLibraryIdentifier":"d1","logs":["a","b"]}"#);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].device_library_identifier.as_deref(), Some("d1"));
        assert_eq!(entries[1].message, "b");
        assert!(entries.iter().all(|e| e.level == LogLevel::Error));
    }

    #[test]
    fn test_structured_logs_keep_context() {
        let entries = parse_upload(
            br#"{"logs":[{"message":"boom","serialNumber":"s1","context":{"code":7}}]}"#,
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].serial_number.as_deref(), Some("s1"));
        assert_eq!(entries[0].context, Some(serde_json::json!({"code": 7})));
        assert_eq!(entries[0].device_library_identifier, None);
    }

    #[test]
    fn test_odd_items_do_not_drop_the_batch() {
        let entries = parse_upload(
            br#"{"deviceLibraryIdentifier":"d1","logs":["good",{"msg":"no message key"},42]}"#,
        );

        assert_eq!(entries.len(), 3);
        assert!(
            entries
                .iter()
                .all(|e| e.device_library_identifier.as_deref() == Some("d1"))
        );
        assert_eq!(entries[0].message, "good");
        assert_eq!(entries[1].message, r#"{"msg":"no message key"}"#);
        assert_eq!(entries[2].message, "42");
    }

    #[test]
    fn test_malformed_body_is_kept_raw() {
        let entries = parse_upload(b"not json at all");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "not json at all");
        assert_eq!(entries[0].level, LogLevel::Error);
    }

    #[test]
    fn test_raw_body_is_truncated() {
        let body = "x".repeat(MAX_MESSAGE_LEN * 2);
        let entries = parse_upload(body.as_bytes());

        assert_eq!(entries[0].message.len(), MAX_MESSAGE_LEN);
    }
}
