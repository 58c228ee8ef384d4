//! Backup command

use std::path::Path;
use std::time::Duration;

use dbtools_core::process::Compression;
use dbtools_core::{BackupOperation, DbToolsResult};

use crate::commands::load_context;
use crate::console::CLIConsole;
use crate::signals::cancellation_on_ctrl_c;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config_file: &Path,
    connection: Option<&str>,
    timeout: Option<Duration>,
    compress: bool,
    no_compress: bool,
    extra: Option<&str>,
    no_cleanup: bool,
    verbose: bool,
) -> DbToolsResult<()> {
    let console = CLIConsole::new(verbose);
    let context = load_context(config_file)?;
    let resolved = context.config.resolve_connection(connection)?;

    console.info(&format!(
        "Backing up `{}` ({})",
        resolved.name, resolved.descriptor
    ));
    console.info(&format!(
        "Repository: {}",
        context.storage.storage_path().display()
    ));

    let compression = if compress {
        Compression::Gzip
    } else if no_compress {
        Compression::None
    } else {
        context.config.backup.compression
    };
    let timeout = timeout.or(context.config.backup.timeout);

    let mut args = resolved.backup_args;
    if let Some(raw) = extra {
        args.extend(dbtools_core::config::parse_tool_args(raw)?);
    }

    let mut operation = BackupOperation::new(
        resolved.descriptor,
        context.storage,
        context.backupers,
    )
    .extra_args(args)
    .compression(compression)
    .grace(context.config.process.grace)
    .cancel(cancellation_on_ctrl_c());

    if !no_cleanup && context.config.backup.cleanup {
        operation = operation.cleanup(context.config.backup.retention.clone());
    }
    if let Some(limit) = timeout {
        operation = operation.timeout(limit);
    }

    let report = operation.run().await?;

    console.success(&format!(
        "Backup complete: {} ({} bytes in {})",
        report.entry.filename,
        report.entry.size_bytes,
        humantime::format_duration(Duration::from_secs(report.duration.as_secs())),
    ));
    if let Some(pruned) = &report.pruned {
        if !pruned.deleted.is_empty() {
            console.info(&format!(
                "Cleaned up {} old backup(s), freed {} bytes",
                pruned.deleted.len(),
                pruned.freed_bytes
            ));
        }
    }
    if let Some(reason) = &report.prune_error {
        console.warn(&format!("Backup kept, cleanup failed: {}", reason));
    }
    Ok(())
}
