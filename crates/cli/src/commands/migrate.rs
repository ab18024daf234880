//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! wallet-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `WALLET_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/server/migrations/` and are embedded at build
//! time.

use super::{CliError, connect};

/// Run the wallet schema migrations.
pub async fn run() -> Result<(), CliError> {
    let pool = connect().await?;

    tracing::info!("Running wallet migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Wallet migrations complete!");
    Ok(())
}
