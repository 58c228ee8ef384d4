//! Prune command

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use dbtools_core::DbToolsResult;

use crate::commands::{entry_line, load_context};
use crate::console::CLIConsole;

pub async fn run(
    config_file: &Path,
    keep_last: Option<usize>,
    max_age: Option<Duration>,
    dry_run: bool,
    verbose: bool,
) -> DbToolsResult<()> {
    let console = CLIConsole::new(verbose);
    let context = load_context(config_file)?;

    // flags override the configured policy field by field
    let mut policy = context.config.backup.retention.clone();
    if keep_last.is_some() {
        policy.keep_last = keep_last;
    }
    if max_age.is_some() {
        policy.max_age = max_age;
    }

    if policy.is_unbounded() {
        console.warn("Retention policy is unbounded, nothing to prune");
        return Ok(());
    }

    if dry_run {
        let victims = context.storage.plan_prune(&policy).await?;
        if victims.is_empty() {
            console.success("Nothing to prune");
            return Ok(());
        }
        console.print_header("Would delete");
        let now = Utc::now();
        for entry in &victims {
            println!("{}", entry_line(entry, now));
        }
        let total: u64 = victims.iter().map(|entry| entry.size_bytes).sum();
        console.info(&format!("{} backup(s), {} bytes", victims.len(), total));
        return Ok(());
    }

    let report = context.storage.prune(&policy).await?;
    if report.deleted.is_empty() && report.failures == 0 {
        console.success("Nothing to prune");
        return Ok(());
    }

    for filename in &report.deleted {
        console.info(&format!("Deleted {}", filename));
    }
    console.success(&format!(
        "Pruned {} backup(s), freed {} bytes",
        report.deleted.len(),
        report.freed_bytes
    ));
    if report.failures > 0 {
        console.warn(&format!("{} deletion(s) failed, see log", report.failures));
    }
    Ok(())
}
