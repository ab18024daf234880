//! Manual broadcast to every device registered for a pass.

use wallet_core::PassKey;

use super::{CliError, connect, dispatcher};

/// Wake every device registered for the pass and report the outcome.
pub async fn run(pass_type_identifier: &str, serial_number: &str) -> Result<(), CliError> {
    let pool = connect().await?;
    let key = PassKey::new(pass_type_identifier, serial_number);

    broadcast(&dispatcher(&pool)?, &key).await
}

/// Broadcast and turn a total failure into an error.
pub async fn broadcast(
    dispatcher: &wallet_server::services::NotificationDispatcher,
    key: &PassKey,
) -> Result<(), CliError> {
    let report = dispatcher.broadcast(key).await?;

    tracing::info!(
        pass = %key,
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed,
        "Broadcast complete"
    );

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::BroadcastFailed(report.attempted))
    }
}
