//! Engine-specific backup and restore strategies
//!
//! One [`Backuper`] / [`Restorer`] pair per supported engine. Strategies
//! are stateless command builders; they never spawn anything themselves.
//! The [`factory`] module owns the ordered registries that map a
//! connection descriptor to its strategy.

pub mod factory;
mod mariadb;
mod mongodb;
mod mysql;
mod postgres;
mod sqlite;

use std::path::Path;

use crate::connection::ConnectionDescriptor;
use crate::error::DbToolsResult;
use crate::process::CommandSpec;

pub use factory::{BackuperFactory, RestorerFactory};
pub use mariadb::{MariaDbBackuper, MariaDbRestorer};
pub use mongodb::{MongoDbBackuper, MongoDbRestorer};
pub use mysql::{MySqlBackuper, MySqlRestorer};
pub use postgres::{PostgresBackuper, PostgresRestorer};
pub use sqlite::{SqliteBackuper, SqliteRestorer};

/// Builds the vendor command that dumps a database to a file
///
/// `dump_command` wires the tool's stdout to `output`; the executor does
/// the streaming. `extra_args` come from per-connection configuration and
/// are spliced in before any positional argument.
#[cfg_attr(test, mockall::automock)]
pub trait Backuper: Send + Sync {
    /// Whether this strategy can dump the described database
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool;

    /// Canonical artifact extension, without compression suffix
    fn extension(&self) -> &'static str;

    /// Vendor tool this strategy invokes
    fn tool(&self) -> &str;

    /// Build the dump invocation writing to `output`
    fn dump_command(
        &self,
        descriptor: &ConnectionDescriptor,
        output: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec>;
}

/// Builds the vendor command that loads a dump file into a database
#[cfg_attr(test, mockall::automock)]
pub trait Restorer: Send + Sync {
    /// Whether this strategy can restore into the described database
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool;

    /// Artifact extension this strategy consumes
    fn extension(&self) -> &'static str;

    /// Vendor tool this strategy invokes
    fn tool(&self) -> &str;

    /// Build the restore invocation reading from `input`
    fn restore_command(
        &self,
        descriptor: &ConnectionDescriptor,
        input: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec>;
}

impl std::fmt::Debug for dyn Restorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Restorer")
    }
}
