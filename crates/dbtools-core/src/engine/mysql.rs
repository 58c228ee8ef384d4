//! MySQL strategies: `mysqldump` SQL dumps
//!
//! Credentials travel through a `--defaults-extra-file`, never argv. The
//! MariaDB strategies reuse the option-file plumbing from here since the
//! tools share the client option grammar.

use std::path::Path;

use crate::connection::{ConnectionDescriptor, EngineKind};
use crate::engine::{Backuper, Restorer};
use crate::error::DbToolsResult;
use crate::process::{CommandSpec, CREDENTIALS_PLACEHOLDER};

const EXTENSION: &str = "sql";

/// Option-file contents for the client tools, or `None` when the
/// descriptor carries no credentials
pub(crate) fn credentials_file(descriptor: &ConnectionDescriptor) -> Option<String> {
    if descriptor.username.is_none() && descriptor.password.is_none() {
        return None;
    }
    let mut contents = String::from("[client]\n");
    if let Some(username) = &descriptor.username {
        contents.push_str(&format!("user = \"{}\"\n", option_file_escape(username)));
    }
    if let Some(password) = &descriptor.password {
        contents.push_str(&format!("password = \"{}\"\n", option_file_escape(password)));
    }
    Some(contents)
}

// double-quoted option file values use backslash escapes
fn option_file_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Common client options; `--defaults-extra-file` must stay the first
/// argument or the tools reject it
pub(crate) fn apply_client_options(
    spec: CommandSpec,
    descriptor: &ConnectionDescriptor,
) -> CommandSpec {
    let mut spec = spec;
    if let Some(contents) = credentials_file(descriptor) {
        spec = spec
            .arg(format!("--defaults-extra-file={}", CREDENTIALS_PLACEHOLDER))
            .credentials(contents);
    }
    if let Some(host) = &descriptor.host {
        spec = spec.arg("--host").arg(host);
    }
    if let Some(port) = descriptor.port {
        spec = spec.arg("--port").arg(port.to_string());
    }
    spec
}

pub struct MySqlBackuper {
    mysqldump: String,
}

impl MySqlBackuper {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            mysqldump: tool.unwrap_or("mysqldump").to_string(),
        }
    }
}

impl Default for MySqlBackuper {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Backuper for MySqlBackuper {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        // MariaDB speaks the same protocol; the factory prefers the
        // dedicated MariaDB strategy when it is registered
        matches!(descriptor.kind, EngineKind::MySql | EngineKind::MariaDb)
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.mysqldump
    }

    fn dump_command(
        &self,
        descriptor: &ConnectionDescriptor,
        output: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        let mut spec = apply_client_options(CommandSpec::new(&self.mysqldump), descriptor);
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database);
        Ok(spec.stdout_to(output))
    }
}

pub struct MySqlRestorer {
    mysql: String,
}

impl MySqlRestorer {
    pub fn new(tool: Option<&str>) -> Self {
        Self {
            mysql: tool.unwrap_or("mysql").to_string(),
        }
    }
}

impl Default for MySqlRestorer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Restorer for MySqlRestorer {
    fn supports(&self, descriptor: &ConnectionDescriptor) -> bool {
        matches!(descriptor.kind, EngineKind::MySql | EngineKind::MariaDb)
    }

    fn extension(&self) -> &'static str {
        EXTENSION
    }

    fn tool(&self) -> &str {
        &self.mysql
    }

    fn restore_command(
        &self,
        descriptor: &ConnectionDescriptor,
        input: &Path,
        extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        descriptor.validate()?;
        let mut spec = apply_client_options(CommandSpec::new(&self.mysql), descriptor);
        spec = spec.args(extra_args.iter().cloned());
        spec = spec.arg(&descriptor.database);
        Ok(spec.stdin_from(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            kind: EngineKind::MySql,
            host: Some("localhost".to_string()),
            port: Some(3306),
            username: Some("root".to_string()),
            password: Some("pa\"ss\\word".to_string()),
            database: "app".to_string(),
        }
    }

    #[test]
    fn test_credentials_go_through_option_file() {
        let backuper = MySqlBackuper::default();
        let spec = backuper
            .dump_command(&descriptor(), Path::new("/tmp/out.sql"), &[])
            .unwrap();

        assert_eq!(
            spec.args[0],
            format!("--defaults-extra-file={}", CREDENTIALS_PLACEHOLDER)
        );
        assert!(spec.args.iter().all(|a| !a.contains("ss\\word")));

        let contents = spec.credentials.unwrap();
        assert!(contents.starts_with("[client]\n"));
        assert!(contents.contains("user = \"root\""));
        assert!(contents.contains("password = \"pa\\\"ss\\\\word\""));
    }

    #[test]
    fn test_no_credentials_no_option_file() {
        let mut descriptor = descriptor();
        descriptor.username = None;
        descriptor.password = None;

        let backuper = MySqlBackuper::default();
        let spec = backuper
            .dump_command(&descriptor, Path::new("/tmp/out.sql"), &[])
            .unwrap();

        assert!(spec.credentials.is_none());
        assert_eq!(spec.args, vec!["--host", "localhost", "--port", "3306", "app"]);
    }

    #[test]
    fn test_restore_streams_file_into_client() {
        let restorer = MySqlRestorer::default();
        let spec = restorer
            .restore_command(&descriptor(), Path::new("/b/x.sql"), &[])
            .unwrap();

        assert_eq!(spec.program, "mysql");
        assert_eq!(spec.args.last().map(String::as_str), Some("app"));
        assert_eq!(spec.stdin_file.as_deref(), Some(Path::new("/b/x.sql")));
    }

    #[test]
    fn test_supports_mariadb_as_compatible_superset() {
        let backuper = MySqlBackuper::default();
        let mut descriptor = descriptor();
        descriptor.kind = EngineKind::MariaDb;
        assert!(backuper.supports(&descriptor));
    }
}
