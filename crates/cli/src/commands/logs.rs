//! Show recent device log entries.

use wallet_server::db::{DeviceLogRepository, LogSink};
use wallet_server::models::DeviceLog;

use super::{CliError, connect};

/// Print the newest `limit` entries, newest first.
pub async fn run(limit: i64) -> Result<(), CliError> {
    let pool = connect().await?;
    let entries = DeviceLogRepository::new(pool).recent(limit).await?;

    #[allow(clippy::print_stdout)]
    for entry in &entries {
        println!("{}", format_entry(entry));
    }

    tracing::info!(count = entries.len(), "Listed device logs");
    Ok(())
}

fn format_entry(entry: &DeviceLog) -> String {
    let device = entry.device_library_identifier.as_deref().unwrap_or("-");
    let pass = match (&entry.pass_type_identifier, &entry.serial_number) {
        (Some(pass_type), Some(serial)) => format!("{pass_type}/{serial}"),
        _ => "-".to_string(),
    };
    format!(
        "{} {:<5} device={device} pass={pass} {}",
        entry.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
        entry.level.as_str(),
        entry.message
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use wallet_core::{DeviceLogId, LogLevel};

    use super::*;

    #[test]
    fn test_format_entry() {
        let entry = DeviceLog {
            id: DeviceLogId::new(1),
            device_library_identifier: Some("d1".to_string()),
            level: LogLevel::Error,
            message: "download failed".to_string(),
            pass_type_identifier: Some("pass.t".to_string()),
            serial_number: Some("s1".to_string()),
            context: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        };

        assert_eq!(
            format_entry(&entry),
            "2026-03-01T12:00:00Z error device=d1 pass=pass.t/s1 download failed"
        );
    }
}
