mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gatherer",
    version,
    about = "Batch retrieval from tabular sources into tabular results"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace). Defaults to the level
    /// implied by the config's verbose/debug/quiet flags.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration and resolve its helper and extensions
    Check {
        /// Path to the YAML or JSON configuration
        config: PathBuf,
    },
    /// Print the records of one dataset of a JSON workbook
    Records {
        /// Path to the YAML or JSON configuration
        config: PathBuf,
        /// Path to the JSON workbook
        workbook: PathBuf,
        /// Dataset (tab) id
        dataset: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Check { config } => commands::check::execute(&config, log_level),
        Commands::Records {
            config,
            workbook,
            dataset,
        } => commands::records::execute(&config, &workbook, &dataset, log_level).await,
    }
}
