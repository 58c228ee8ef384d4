//! List command

use std::path::Path;

use chrono::Utc;
use dbtools_core::DbToolsResult;

use crate::commands::{empty_repository_message, entry_line, load_context};
use crate::console::CLIConsole;

pub async fn run(
    config_file: &Path,
    connection: Option<&str>,
    json: bool,
    verbose: bool,
) -> DbToolsResult<()> {
    let context = load_context(config_file)?;

    // a named connection narrows the listing to what it could restore
    let entries = match connection {
        Some(name) => {
            let resolved = context.config.resolve_connection(Some(name))?;
            let restorer = context.restorers.create(&resolved.descriptor)?;
            context.storage.list_candidates(restorer.extension()).await?
        }
        None => context.storage.list_backups().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let console = CLIConsole::new(verbose);
    console.print_header("Backups list");
    if entries.is_empty() {
        console.warn(&empty_repository_message(context.storage.storage_path()));
        return Ok(());
    }

    let now = Utc::now();
    for entry in &entries {
        println!("{}", entry_line(entry, now));
    }

    console.print_separator();
    let total: u64 = entries.iter().map(|entry| entry.size_bytes).sum();
    console.info(&format!(
        "{} backup(s), {} bytes total",
        entries.len(),
        total
    ));
    Ok(())
}
