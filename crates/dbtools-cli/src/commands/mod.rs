//! CLI command implementations

pub mod backup;
pub mod check;
pub mod config;
pub mod list;
pub mod prune;
pub mod restore;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dbtools_core::{
    BackupEntry, BackuperFactory, DbToolsConfig, DbToolsResult, RestorerFactory, Storage,
};

/// Everything a command needs, derived from the configuration file once
pub(crate) struct AppContext {
    pub config: DbToolsConfig,
    pub storage: Storage,
    pub backupers: Arc<BackuperFactory>,
    pub restorers: Arc<RestorerFactory>,
}

pub(crate) fn load_context(config_file: &Path) -> DbToolsResult<AppContext> {
    let config = DbToolsConfig::load_from_file(config_file)?;
    let storage = config.storage();
    let backupers = Arc::new(BackuperFactory::with_tools(&config.tools));
    let restorers = Arc::new(RestorerFactory::with_tools(&config.tools));
    Ok(AppContext {
        config,
        storage,
        backupers,
        restorers,
    })
}

/// Listing line for one artifact, shared by every listing surface
pub(crate) fn entry_line(entry: &BackupEntry, now: DateTime<Utc>) -> String {
    format!("  {} ({})", entry.filename, entry.age_label(now))
}

/// Wording kept exactly as the tool has always printed it
pub(crate) fn empty_repository_message(path: &Path) -> String {
    format!("There is no backup files available in {}", path.display())
}
