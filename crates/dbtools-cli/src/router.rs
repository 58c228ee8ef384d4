//! Command routing

use dbtools_core::DbToolsResult;

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;

/// Dispatch the parsed command line to its implementation
pub async fn route(cli: Cli) -> DbToolsResult<()> {
    let Cli {
        config_file,
        verbose,
        command,
    } = cli;

    match command {
        Commands::Backup {
            connection,
            timeout,
            compress,
            no_compress,
            extra,
            no_cleanup,
        } => {
            commands::backup::run(
                &config_file,
                connection.as_deref(),
                timeout,
                compress,
                no_compress,
                extra.as_deref(),
                no_cleanup,
                verbose,
            )
            .await
        }
        Commands::Restore {
            connection,
            filename,
            latest: _,
            list,
            force,
            timeout,
        } => {
            commands::restore::run(
                &config_file,
                connection.as_deref(),
                filename.as_deref(),
                list,
                force,
                timeout,
                verbose,
            )
            .await
        }
        Commands::List { connection, json } => {
            commands::list::run(&config_file, connection.as_deref(), json, verbose).await
        }
        Commands::Prune {
            keep_last,
            max_age,
            dry_run,
        } => commands::prune::run(&config_file, keep_last, max_age, dry_run, verbose).await,
        Commands::Check { connection } => {
            commands::check::run(&config_file, connection.as_deref()).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config::init(&config_file, force).await,
            ConfigAction::Show => commands::config::show(&config_file).await,
        },
    }
}
