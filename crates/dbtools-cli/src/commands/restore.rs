//! Restore command

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use dbtools_core::{DbToolsResult, RestoreOperation};

use crate::commands::{empty_repository_message, entry_line, load_context};
use crate::console::CLIConsole;
use crate::signals::cancellation_on_ctrl_c;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config_file: &Path,
    connection: Option<&str>,
    filename: Option<&str>,
    list: bool,
    force: bool,
    timeout: Option<Duration>,
    verbose: bool,
) -> DbToolsResult<()> {
    let console = CLIConsole::new(verbose);
    let context = load_context(config_file)?;
    let resolved = context.config.resolve_connection(connection)?;

    // candidates are filtered by the extension the target engine restores
    let restorer = context.restorers.create(&resolved.descriptor)?;

    if list {
        console.print_header("Backups list");
        let candidates = context
            .storage
            .list_candidates(restorer.extension())
            .await?;
        if candidates.is_empty() {
            console.warn(&empty_repository_message(context.storage.storage_path()));
            return Ok(());
        }
        let now = Utc::now();
        for entry in &candidates {
            println!("{}", entry_line(entry, now));
        }
        return Ok(());
    }

    if !force {
        let proceed = console.confirm(&format!(
            "Restoring will overwrite database `{}`. Continue?",
            resolved.descriptor.database
        ))?;
        if !proceed {
            console.warn("Restore aborted");
            return Ok(());
        }
    }

    let timeout = timeout.or(context.config.restore.timeout);

    let mut operation = RestoreOperation::new(
        resolved.descriptor,
        context.storage,
        context.restorers,
    )
    .extra_args(resolved.restore_args)
    .grace(context.config.process.grace)
    .cancel(cancellation_on_ctrl_c());

    if let Some(filename) = filename {
        operation = operation.filename(filename);
    }
    if let Some(limit) = timeout {
        operation = operation.timeout(limit);
    }

    let report = operation.run().await?;

    console.success(&format!(
        "Restored {} into `{}` in {}",
        report.filename,
        resolved.name,
        humantime::format_duration(Duration::from_secs(report.duration.as_secs())),
    ));
    Ok(())
}
