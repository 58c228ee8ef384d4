//! db-tools CLI application
//!
//! Backs up and restores databases through their vendors' own tools.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/dbtools-cli
//! ```
//!
//! # Quick start
//!
//! ```bash
//! dbtools config init            # create dbtools.toml
//! dbtools check                  # verify vendor tools are reachable
//! dbtools backup                 # dump the default connection
//! dbtools list                   # see what is stored
//! dbtools restore --force        # load the most recent dump back
//! ```
//!
//! Connections, the repository location, retention and tool paths all
//! live in the configuration file; every command takes `--config FILE`
//! (or `DBTOOLS_CONFIG`) to point somewhere else.

mod args;
mod commands;
mod console;
mod router;
mod signals;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::console::CLIConsole;

// Re-export for external use
pub use args::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; -v raises the default level for our crates only
    let default_filter = if cli.verbose {
        "dbtools_cli=debug,dbtools_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    if let Err(error) = router::route(cli).await {
        CLIConsole::new(true).error(&error.to_string());
        let code = match error {
            dbtools_core::DbToolsError::Cancelled => 130,
            _ => 1,
        };
        std::process::exit(code);
    }
}
