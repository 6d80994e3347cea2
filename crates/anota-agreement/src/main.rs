//! Compare human and model ratings in a workbook and write agreement
//! statistics back into it.
//!
//! ```sh
//! anota-agreement comparison.json
//! ```

use anota_agreement::AgreementConfig;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Human/model agreement statistics for anota workbooks.
#[derive(Parser)]
#[command(name = "anota-agreement")]
struct Cli {
    /// Path of the comparison config JSON file
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = AgreementConfig::load(&cli.config).and_then(|config| anota_agreement::run(&config));
    match result {
        Ok(reports) => {
            info!("processing complete: {} columns compared", reports.len());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
