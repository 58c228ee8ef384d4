//! SQLite strategies: `sqlite3` text dumps and replay
//!
//! `database` is a filesystem path here; host, port and credentials are
//! rejected by descriptor validation.

use std::path::Path;

use crate::connection::{ConnectionDescriptor, EngineKind};
use crate::engine::{Backuper, Restorer};
use crate::error::DbToolsResult;
use crate::process::CommandSpec;

const EXTENSION: &str = "sql";

pub struct SqliteBackuper {
    sqlite3: String,
}

impl SqliteBackuper {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            sqlite3: tool.unwrap_or("sqlite3").to_string(),
        }
    }
}

impl Default for SqliteBackuper {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Backuper for SqliteBackuper {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.kind == EngineKind::Sqlite
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.sqlite3
    }

    fn dump_command(
        &self,
        descriptor: &ConnectionDescriptor,
        output: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        let mut spec = CommandSpec::new(&self.sqlite3).arg("-bail");
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database).arg(".dump");
        Ok(spec.stdout_to(output))
    }
}

pub struct SqliteRestorer {
    sqlite3: String,
}

impl SqliteRestorer {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            sqlite3: tool.unwrap_or("sqlite3").to_string(),
        }
    }
}

impl Default for SqliteRestorer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Restorer for SqliteRestorer {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.kind == EngineKind::Sqlite
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.sqlite3
    }

    fn restore_command(
        &self,
        descriptor: &ConnectionDescriptor,
        input: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        // without -bail the shell swallows SQL errors and still exits 0
        let mut spec = CommandSpec::new(&self.sqlite3).arg("-bail");
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database);
        Ok(spec.stdin_from(input))
    }
}
