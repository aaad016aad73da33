//! CPU crash-dump CLI
//!
//! Collects a crash dump locally against a bus fixture, or drives a running
//! crashdumpd: triggering collections and managing its stored logs.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{collect, daemon};
use crashdump_lib::TriggerType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CPU crash-dump collector
#[derive(Parser)]
#[command(name = "crashdump")]
#[command(author, version, about = "CLI for CPU crash-dump collection", long_about = None)]
pub struct Cli {
    /// Daemon API URL (can also be set via CRASHDUMP_API_URL env var)
    #[arg(long, env = "CRASHDUMP_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect a crash dump on this machine
    Collect {
        /// Collect only this socket
        socket: Option<usize>,

        /// Trigger type recorded in the document
        #[arg(long = "type", default_value = "On-Demand")]
        trigger_type: String,

        /// Scripted bus description to collect from
        #[arg(long, env = "CRASHDUMP_BUS_FIXTURE")]
        fixture: Option<PathBuf>,

        /// Directory holding the input documents
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Write the document to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Ask the daemon to start a collection
    Trigger {
        /// Trigger type (On-Demand, IERR, ERR2, PostReset, Telemetry)
        #[arg(long = "type", default_value = "On-Demand")]
        trigger_type: String,
    },

    /// Show the daemon's collection status
    Status,

    /// Manage logs stored by the daemon
    #[command(subcommand)]
    Logs(LogsCommands),
}

#[derive(Subcommand)]
pub enum LogsCommands {
    /// List stored logs
    List,

    /// Print one stored log
    Show {
        /// Log file name
        name: String,

        /// Save the log to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete every stored log
    DeleteAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load()?;

    if let Commands::Collect {
        socket,
        trigger_type,
        fixture,
        input_dir,
        output,
    } = cli.command
    {
        let options = collect::CollectOptions {
            socket,
            trigger: TriggerType::from(trigger_type),
            fixture: fixture.or(config.fixture),
            input_dir: input_dir.or(config.input_dir),
            output,
        };
        tokio::task::spawn_blocking(move || collect::run(options)).await??;
        return Ok(());
    }

    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    match cli.command {
        Commands::Collect { .. } => {}
        Commands::Trigger { trigger_type } => {
            daemon::trigger(&client, &trigger_type).await?;
        }
        Commands::Status => {
            daemon::status(&client, cli.format).await?;
        }
        Commands::Logs(logs_cmd) => match logs_cmd {
            LogsCommands::List => {
                daemon::list_logs(&client, cli.format).await?;
            }
            LogsCommands::Show { name, output } => {
                daemon::show_log(&client, &name, output).await?;
            }
            LogsCommands::DeleteAll => {
                daemon::delete_all(&client).await?;
            }
        },
    }

    Ok(())
}
