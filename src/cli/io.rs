//! JSON output for CLI commands
//!
//! - Results: one JSON object on stdout
//! - Errors: one JSON object on stderr
//! - Pipeline events go to stderr through the event sink, so stdout stays
//!   a single parseable document

use std::io::{self, Write};

use serde::Serialize;
use serde_json::json;

use super::errors::{CliError, CliResult};

/// Write a command result to stdout
pub fn write_report<T: Serialize>(report: &T) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, report)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write an error object to stderr
pub fn write_error(error: &CliError) {
    let body = json!({
        "status": "error",
        "code": error.code(),
        "message": error.to_string(),
    });
    let mut stderr = io::stderr().lock();
    // Nothing left to report to if stderr itself fails
    let _ = writeln!(stderr, "{}", body);
}
