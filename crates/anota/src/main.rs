//! Run an annotation or summary pass over a workbook.
//!
//! All run parameters live in the JSON config file; the CLI carries nothing
//! but the mode and the config path.
//!
//! # Examples
//!
//! ```sh
//! # Annotate every code column against the configured endpoint
//! anota annotate run.json
//!
//! # Fill the context-summary column for a later "column" context run
//! anota summarize run.json
//! ```

use anota::config::RunConfig;
use anota::pipeline::{self, RunSummary};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// LLM-assisted qualitative coding of learning-activity records.
#[derive(Parser)]
#[command(name = "anota")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Annotate every code column for the configured rows
    Annotate {
        /// Path of the run config JSON file
        config: PathBuf,
    },
    /// Fill the context-summary column for the configured rows
    Summarize {
        /// Path of the run config JSON file
        config: PathBuf,
    },
}

async fn run(command: &Command) -> Result<RunSummary, String> {
    match command {
        Command::Annotate { config } => {
            let config = RunConfig::load(config)?;
            pipeline::annotate(&config).await
        }
        Command::Summarize { config } => {
            let config = RunConfig::load(config)?;
            pipeline::summarize(&config).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli.command).await {
        Ok(summary) => {
            info!(
                "done: {} cells written ({} errors) between {} and {}",
                summary.cells_written, summary.errors, summary.started, summary.finished
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
