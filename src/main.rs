//! featuregate CLI entry point
//!
//! Parses arguments, dispatches to the CLI module, reports errors on stderr
//! and exits non-zero on failure. All logic lives in the library.

use featuregate::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        cli::write_error(&e);
        std::process::exit(1);
    }
}
