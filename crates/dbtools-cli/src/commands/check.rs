//! Check command
//!
//! Verifies that the repository is usable and that every configured
//! connection's vendor tools answer a `--version` probe.

use std::path::Path;

use dbtools_core::config::defaults;
use dbtools_core::{DbToolsError, DbToolsResult};

use crate::commands::{load_context, AppContext};
use crate::console::CLIConsole;

pub async fn run(config_file: &Path, connection: Option<&str>) -> DbToolsResult<()> {
    let console = CLIConsole::new(true);
    let context = load_context(config_file)?;

    console.print_header("Environment check");

    let mut failures = 0usize;

    match context.storage.ensure_root().await {
        Ok(()) => console.success(&format!(
            "Repository: {}",
            context.storage.storage_path().display()
        )),
        Err(error) => {
            failures += 1;
            console.error(&format!("Repository: {}", error));
        }
    }

    let names: Vec<String> = match connection {
        Some(name) => vec![name.to_string()],
        None => {
            let mut names: Vec<String> = context.config.connections.keys().cloned().collect();
            names.sort();
            names
        }
    };

    if names.is_empty() {
        console.warn("No connections configured, nothing else to check");
        return Ok(());
    }

    for name in &names {
        failures += check_connection(&console, &context, name).await;
    }

    if failures > 0 {
        return Err(DbToolsError::config(format!(
            "{} check(s) failed",
            failures
        )));
    }
    console.success("All checks passed");
    Ok(())
}

async fn check_connection(console: &CLIConsole, context: &AppContext, name: &str) -> usize {
    let resolved = match context.config.resolve_connection(Some(name)) {
        Ok(resolved) => resolved,
        Err(error) => {
            console.error(&format!("Connection `{}`: {}", name, error));
            return 1;
        }
    };

    let (backuper, restorer) = match (
        context.backupers.create(&resolved.descriptor),
        context.restorers.create(&resolved.descriptor),
    ) {
        (Ok(backuper), Ok(restorer)) => (backuper, restorer),
        (Err(error), _) | (_, Err(error)) => {
            console.error(&format!("Connection `{}`: {}", name, error));
            return 1;
        }
    };

    println!();
    println!(
        "Connection `{}` ({})",
        name,
        resolved.descriptor.kind.as_str()
    );

    let mut tools = vec![backuper.tool().to_string()];
    if restorer.tool() != backuper.tool() {
        tools.push(restorer.tool().to_string());
    }

    let mut failures = 0;
    for tool in &tools {
        match probe(tool).await {
            Ok(version) => console.success(&format!("{}: {}", tool, version)),
            Err(message) => {
                failures += 1;
                console.error(&format!("{}: {}", tool, message));
            }
        }
    }
    failures
}

/// Run `tool --version` with a short deadline and return its first line
async fn probe(tool: &str) -> Result<String, String> {
    let probed = tokio::time::timeout(
        defaults::probe_timeout(),
        tokio::process::Command::new(tool).arg("--version").output(),
    )
    .await;

    match probed {
        Err(_) => Err("probe timed out".to_string()),
        Ok(Err(error)) => Err(format!("not found ({})", error)),
        Ok(Ok(output)) if !output.status.success() => {
            Err(format!("exited with {}", output.status))
        }
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(stdout
                .lines()
                .next()
                .unwrap_or("version unknown")
                .trim()
                .to_string())
        }
    }
}
