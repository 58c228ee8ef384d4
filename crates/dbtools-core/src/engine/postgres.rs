//! PostgreSQL strategies: `pg_dump` custom-format archives

use std::path::Path;

use crate::connection::{ConnectionDescriptor, EngineKind};
use crate::engine::{Backuper, Restorer};
use crate::error::DbToolsResult;
use crate::process::CommandSpec;

const EXTENSION: &str = "dump";

/// Password goes through the environment, never argv
const PASSWORD_ENV: &str = "PGPASSWORD";

fn base_args(spec: CommandSpec, descriptor: &ConnectionDescriptor) -> CommandSpec {
    let mut spec = spec.arg("--no-password");
    if let Some(host) = &descriptor.host {
        spec = spec.arg("--host").arg(host);
    }
    if let Some(port) = descriptor.port {
        spec = spec.arg("--port").arg(port.to_string());
    }
    if let Some(username) = &descriptor.username {
        spec = spec.arg("--username").arg(username);
    }
    spec
}

fn with_password(spec: CommandSpec, descriptor: &ConnectionDescriptor) -> CommandSpec {
    match &descriptor.password {
        Some(password) => spec.env(PASSWORD_ENV, password),
        None => spec,
    }
}

pub struct PostgresBackuper {
    pg_dump: String,
}

impl PostgresBackuper {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            pg_dump: tool.unwrap_or("pg_dump").to_string(),
        }
    }
}

impl Default for PostgresBackuper {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Backuper for PostgresBackuper {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.kind == EngineKind::Postgres
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.pg_dump
    }

    fn dump_command(
        &self,
        descriptor: &ConnectionDescriptor,
        output: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        // custom format keeps the archive compact and restorable via pg_restore
        let mut spec = base_args(CommandSpec::new(&self.pg_dump), descriptor).arg("--format=c");
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database);
        Ok(with_password(spec, descriptor).stdout_to(output))
    }
}

pub struct PostgresRestorer {
    pg_restore: String,
}

impl PostgresRestorer {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            pg_restore: tool.unwrap_or("pg_restore").to_string(),
        }
    }
}

impl Default for PostgresRestorer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Restorer for PostgresRestorer {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.kind == EngineKind::Postgres
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.pg_restore
    }

    fn restore_command(
        &self,
        descriptor: &ConnectionDescriptor,
        input: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        // --clean --if-exists makes restoring over an existing schema idempotent
        let mut spec = base_args(CommandSpec::new(&self.pg_restore), descriptor)
            .arg("--clean")
            .arg("--if-exists")
            .arg("--dbname")
            .arg(&descriptor.database);
        spec = spec.args(extra_args.iter().cloned());
        Ok(with_password(spec, descriptor).stdin_from(input))
    }
}
