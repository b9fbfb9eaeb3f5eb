//! CLI module for featuregate
//!
//! Provides command-line interface for:
//! - run: One pipeline run over the configured source
//! - validate: Dry validation report for a file
//! - recalibrate: Baseline replacement from a trusted window
//! - register: Contract publication

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{recalibrate, register, run_command, validate};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_report};

/// Parse arguments and execute the selected command.
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command).await
}
