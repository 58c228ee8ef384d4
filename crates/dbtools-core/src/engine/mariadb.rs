//! MariaDB strategies: `mariadb-dump` SQL dumps
//!
//! Same client option grammar as MySQL, dedicated binaries. Registered
//! ahead of the MySQL strategies so MariaDB descriptors get these tools.

use std::path::Path;

use crate::connection::{ConnectionDescriptor, EngineKind};
use crate::engine::mysql::apply_client_options;
use crate::engine::{Backuper, Restorer};
use crate::error::DbToolsResult;
use crate::process::CommandSpec;

const EXTENSION: &str = "sql";

pub struct MariaDbBackuper {
    mariadb_dump: String,
}

impl MariaDbBackuper {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            mariadb_dump: tool.unwrap_or("mariadb-dump").to_string(),
        }
    }
}

impl Default for MariaDbBackuper {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Backuper for MariaDbBackuper {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.kind == EngineKind::MariaDb
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.mariadb_dump
    }

    fn dump_command(
        &self,
        descriptor: &ConnectionDescriptor,
        output: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        let mut spec = apply_client_options(CommandSpec::new(&self.mariadb_dump), descriptor);
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database);
        Ok(spec.stdout_to(output))
    }
}

pub struct MariaDbRestorer {
    mariadb: String,
}

impl MariaDbRestorer {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            mariadb: tool.unwrap_or("mariadb").to_string(),
        }
    }
}

impl Default for MariaDbRestorer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Restorer for MariaDbRestorer {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        descriptor.kind == EngineKind::MariaDb
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.mariadb
    }

    fn restore_command(
        &self,
        descriptor: &ConnectionDescriptor,
        input: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        let mut spec = apply_client_options(CommandSpec::new(&self.mariadb), descriptor);
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database);
        Ok(spec.stdin_from(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CREDENTIALS_PLACEHOLDER;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            kind: EngineKind::MariaDb,
            host: Some("db.internal".to_string()),
            port: None,
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: "app".to_string(),
        }
    }

    #[test]
    fn test_uses_mariadb_binaries() {
        let backuper = MariaDbBackuper::default();
        let restorer = MariaDbRestorer::default();
        let dump = backuper
            .dump_command(&descriptor(), Path::new("/tmp/out.sql"), &[])
            .unwrap();
        let restore = restorer
            .restore_command(&descriptor(), Path::new("/tmp/out.sql"), &[])
            .unwrap();

        assert_eq!(dump.program, "mariadb-dump");
        assert_eq!(restore.program, "mariadb");
        assert_eq!(
            dump.args[0],
            format!("--defaults-extra-file={}", CREDENTIALS_PLACEHOLDER)
        );
    }

    #[test]
    fn test_rejects_plain_mysql() {
        let backuper = MariaDbBackuper::default();
        let mut descriptor = descriptor();
        descriptor.kind = EngineKind::MySql;
        assert!(!backuper.supports(&descriptor));
    }
}
