//! ibank CLI - download bank transactions and statements

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{checkpoint, citibank, fio, logs, status};

/// Environment variable holding the log filter
const LOG_ENV: &str = "IBANK_LOG";

/// ibank - download transactions and statements from Fio and Citibank CZ
#[derive(Parser)]
#[command(name = "ibank", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fio banka (API token)
    Fio {
        #[command(subcommand)]
        command: fio::FioCommands,
    },

    /// Citibank CZ (username, password and SMS code)
    Citibank {
        #[command(subcommand)]
        command: citibank::CitibankCommands,
    },

    /// Show sync checkpoints of all accounts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage sync checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: checkpoint::CheckpointCommands,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Fio { command } => fio::run(command),
        Commands::Citibank { command } => citibank::run(command),
        Commands::Status { json } => status::run(json),
        Commands::Checkpoint { command } => checkpoint::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
