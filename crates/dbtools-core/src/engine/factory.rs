//! Ordered strategy registries
//!
//! Selection is deterministic: strategies are tried in registration order
//! and the first `supports()` match wins. MariaDB registers ahead of
//! MySQL so its dedicated tools take precedence while MySQL's superset
//! matching still covers MariaDB descriptors in a registry without them.
//! The process-wide default registries are immutable; custom tool paths
//! go through [`BackuperFactory::with_tools`] once at startup.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::config::ToolPaths;
use crate::connection::ConnectionDescriptor;
use crate::engine::{
    Backuper, MariaDbBackuper, MariaDbRestorer, MongoDbBackuper, MongoDbRestorer, MySqlBackuper,
    MySqlRestorer, PostgresBackuper, PostgresRestorer, Restorer, SqliteBackuper, SqliteRestorer,
};
use crate::error::{DbToolsError, DbToolsResult};

/// Default registry resolving vendor tools via `PATH`
pub static DEFAULT_BACKUPERS: Lazy<BackuperFactory> = Lazy::new(BackuperFactory::default);

/// Default registry resolving vendor tools via `PATH`
pub static DEFAULT_RESTORERS: Lazy<RestorerFactory> = Lazy::new(RestorerFactory::default);

pub struct BackuperFactory {
    strategies: Vec<Arc<dyn Backuper>>,
}

impl BackuperFactory {
    /// Registration order is selection order
    pub fn new(strategies: Vec<Arc<dyn Backuper>>) -> Self {
        Self { strategies }
    }

    /// All built-in strategies, honoring configured tool locations
    pub fn with_tools(tools: &ToolPaths) -> Self {
        Self::new(vec![
            Arc::new(MariaDbBackuper::new(tools.mariadb_dump.as_deref())),
            Arc::new(MySqlBackuper::new(tools.mysqldump.as_deref())),
            Arc::new(PostgresBackuper::new(tools.pg_dump.as_deref())),
            Arc::new(SqliteBackuper::new(tools.sqlite3.as_deref())),
            Arc::new(MongoDbBackuper::new(tools.mongodump.as_deref())),
        ])
    }

    /// First strategy supporting the descriptor
    pub fn create(&self, descriptor: &ConnectionDescriptor) -> DbToolsResult<Arc<dyn Backuper>> {
        self.strategies
            .iter()
            .find(|strategy| strategy.supports(descriptor))
            .cloned()
            .ok_or_else(|| DbToolsError::unsupported_engine(descriptor.kind.as_str()))
    }
}

impl Default for BackuperFactory {
    fn default() -> Self {
        Self::with_tools(&ToolPaths::default())
    }
}

pub struct RestorerFactory {
    strategies: Vec<Arc<dyn Restorer>>,
}

impl RestorerFactory {
    /// Registration order is selection order
    pub fn new(strategies: Vec<Arc<dyn Restorer>>) -> Self {
        Self { strategies }
    }

    /// All built-in strategies, honoring configured tool locations
    pub fn with_tools(tools: &ToolPaths) -> Self {
        Self::new(vec![
            Arc::new(MariaDbRestorer::new(tools.mariadb.as_deref())),
            Arc::new(MySqlRestorer::new(tools.mysql.as_deref())),
            Arc::new(PostgresRestorer::new(tools.pg_restore.as_deref())),
            Arc::new(SqliteRestorer::new(tools.sqlite3.as_deref())),
            Arc::new(MongoDbRestorer::new(tools.mongorestore.as_deref())),
        ])
    }

    /// First strategy supporting the descriptor
    pub fn create(&self, descriptor: &ConnectionDescriptor) -> DbToolsResult<Arc<dyn Restorer>> {
        self.strategies
            .iter()
            .find(|strategy| strategy.supports(descriptor))
            .cloned()
            .ok_or_else(|| DbToolsError::unsupported_engine(descriptor.kind.as_str()))
    }
}

impl Default for RestorerFactory {
    fn default() -> Self {
        Self::with_tools(&ToolPaths::default())
    }
}
