//! Wallet CLI - database migrations and pass management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! wallet-cli migrate
//!
//! # Create or replace a pass from a JSON file, then wake registered devices
//! wallet-cli pass put --file pass.json
//!
//! # Deep-merge new data into a pass without notifying devices
//! wallet-cli pass update pass.com.example.ticket 42 --file patch.json --no-notify
//!
//! # Wake every device registered for a pass
//! wallet-cli notify pass.com.example.ticket 42
//!
//! # Show the 50 newest device log entries
//! wallet-cli logs --limit 50
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "wallet-cli")]
#[command(author, version, about = "Wallet web service CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage passes
    Pass {
        #[command(subcommand)]
        action: PassAction,
    },
    /// Wake every device registered for a pass
    Notify {
        /// Pass type identifier
        pass_type_identifier: String,
        /// Serial number
        serial_number: String,
    },
    /// Show recent device log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum PassAction {
    /// Create or replace a pass from a JSON definition file
    Put {
        /// Path to the pass definition
        #[arg(short, long)]
        file: PathBuf,

        /// Skip waking registered devices
        #[arg(long)]
        no_notify: bool,
    },
    /// Deep-merge a JSON object into an existing pass
    Update {
        /// Pass type identifier
        pass_type_identifier: String,
        /// Serial number
        serial_number: String,

        /// Path to the JSON object to merge
        #[arg(short, long)]
        file: PathBuf,

        /// Skip waking registered devices
        #[arg(long)]
        no_notify: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Pass { action } => match action {
            PassAction::Put { file, no_notify } => commands::pass::put(&file, !no_notify).await?,
            PassAction::Update {
                pass_type_identifier,
                serial_number,
                file,
                no_notify,
            } => {
                commands::pass::update(&pass_type_identifier, &serial_number, &file, !no_notify)
                    .await?;
            }
        },
        Commands::Notify {
            pass_type_identifier,
            serial_number,
        } => commands::notify::run(&pass_type_identifier, &serial_number).await?,
        Commands::Logs { limit } => commands::logs::run(limit).await?,
    }
    Ok(())
}
