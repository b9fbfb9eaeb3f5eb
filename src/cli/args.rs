//! CLI argument definitions using clap
//!
//! Commands:
//! - featuregate run --config <path> [--start <date>] [--end <date>]
//! - featuregate validate --config <path> --input <file>
//! - featuregate recalibrate --config <path> --input <file>
//! - featuregate register --config <path> --contract <file>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// featuregate - contract-checked, drift-monitored feature batches
#[derive(Parser, Debug)]
#[command(name = "featuregate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline once over the configured source
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./featuregate.json")]
        config: PathBuf,

        /// Inclusive window start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Exclusive window end (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Validate a file against the contract without writing anything
    Validate {
        #[arg(long, default_value = "./featuregate.json")]
        config: PathBuf,

        /// Records to validate
        #[arg(long)]
        input: PathBuf,
    },

    /// Replace the baseline with statistics of a trusted window
    Recalibrate {
        #[arg(long, default_value = "./featuregate.json")]
        config: PathBuf,

        /// Trusted records
        #[arg(long)]
        input: PathBuf,
    },

    /// Publish a contract file to the registry
    Register {
        #[arg(long, default_value = "./featuregate.json")]
        config: PathBuf,

        /// Contract definition (JSON)
        #[arg(long)]
        contract: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
