//! # CLI Interface
//!
//! Command-line argument structure for `campuspay-server` using `clap`
//! derive. Three subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use campuspay_core::config;

/// CampusPay platform server.
///
/// Serves the REST API for the campus closed-loop payment platform:
/// guardian wallets, student sub-wallets, vendor payments, and
/// administrative settlement.
#[derive(Parser, Debug)]
#[command(
    name = "campuspay-server",
    about = "CampusPay platform server",
    version,
    propagate_version = true
)]
pub struct CampusPayCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server.
    Run(RunArgs),
    /// Initialize the data directory (creates the ledger database).
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory holding the ledger database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "CAMPUSPAY_DATA_DIR", default_value = "~/.campuspay")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "CAMPUSPAY_API_PORT", default_value_t = config::DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CAMPUSPAY_METRICS_PORT", default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "CAMPUSPAY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "CAMPUSPAY_DATA_DIR", default_value = "~/.campuspay")]
    pub data_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        CampusPayCli::command().debug_assert();
    }
}
