//! CLI argument definitions using clap
//!
//! Command structure:
//! - dbtools backup [CONNECTION]    # Dump a database into the repository
//! - dbtools restore [CONNECTION]   # Load a stored dump back
//! - dbtools list                   # Show stored backups, newest first
//! - dbtools prune                  # Apply the retention policy
//! - dbtools check                  # Verify vendor tools and repository
//! - dbtools config init/show       # Manage the configuration file

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "dbtools.toml";

#[derive(Parser)]
#[command(name = "dbtools")]
#[command(about = "Backup and restore databases through their vendor tools")]
#[command(
    long_about = r#"Backup and restore databases through their vendor tools

USAGE:
  dbtools backup                 # Back up the default connection
  dbtools backup analytics       # Back up a named connection
  dbtools restore --list         # Show restorable artifacts
  dbtools restore --force        # Restore the most recent artifact
  dbtools list                   # Show everything in the repository
  dbtools prune --keep-last 5    # Trim the repository

SETUP:
  dbtools config init            # Create a starter config file
  dbtools check                  # Verify vendor tools are installed

For detailed help: dbtools --help"#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        long = "config",
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        env = "DBTOOLS_CONFIG",
        global = true
    )]
    pub config_file: PathBuf,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up a database into the repository
    Backup {
        /// Connection name (defaults to the configured default)
        connection: Option<String>,

        /// Abort the dump after this long (e.g. "15m", "1h30m")
        #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
        timeout: Option<Duration>,

        /// Compress the artifact with gzip while writing it
        #[arg(long, overrides_with = "no_compress")]
        compress: bool,

        /// Write the artifact uncompressed even when the config compresses
        #[arg(long, overrides_with = "compress")]
        no_compress: bool,

        /// Extra arguments passed through to the dump tool (shell-quoted)
        #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
        extra: Option<String>,

        /// Skip the post-backup retention pass
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Restore a database from a stored backup
    Restore {
        /// Connection name (defaults to the configured default)
        connection: Option<String>,

        /// Artifact to restore (defaults to the most recent candidate)
        #[arg(long, value_name = "FILENAME")]
        filename: Option<String>,

        /// Restore the most recent candidate (the default)
        #[arg(long, conflicts_with = "filename")]
        latest: bool,

        /// List restorable artifacts instead of restoring
        #[arg(long)]
        list: bool,

        /// Do not ask for confirmation
        #[arg(long, short = 'f')]
        force: bool,

        /// Abort the restore after this long
        #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
        timeout: Option<Duration>,
    },

    /// List stored backups, newest first
    List {
        /// Only list artifacts restorable into this connection
        connection: Option<String>,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete stored backups beyond the retention policy
    Prune {
        /// Keep this many most recent backups
        #[arg(long, value_name = "N")]
        keep_last: Option<usize>,

        /// Delete backups older than this (e.g. "30days")
        #[arg(long, value_parser = humantime::parse_duration, value_name = "AGE")]
        max_age: Option<Duration>,

        /// Show what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify vendor tools and repository health
    Check {
        /// Only check this connection
        connection: Option<String>,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Create a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backup_with_timeout() {
        let cli = Cli::parse_from([
            "dbtools",
            "backup",
            "main",
            "--timeout",
            "15m",
            "--compress",
            "--extra=--no-owner",
        ]);
        match cli.command {
            Commands::Backup {
                connection,
                timeout,
                compress,
                no_compress,
                extra,
                no_cleanup,
            } => {
                assert_eq!(connection.as_deref(), Some("main"));
                assert_eq!(timeout, Some(Duration::from_secs(900)));
                assert!(compress);
                assert!(!no_compress);
                assert_eq!(extra.as_deref(), Some("--no-owner"));
                assert!(!no_cleanup);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_compress_flags_last_one_wins() {
        let cli = Cli::parse_from(["dbtools", "backup", "--compress", "--no-compress"]);
        match cli.command {
            Commands::Backup {
                compress,
                no_compress,
                ..
            } => {
                assert!(!compress);
                assert!(no_compress);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_latest_conflicts_with_filename() {
        let result = Cli::try_parse_from([
            "dbtools",
            "restore",
            "--latest",
            "--filename",
            "backup_2024-03-20_10-30-00.sql",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["dbtools", "list", "--config", "/etc/dbtools.yaml"]);
        assert_eq!(cli.config_file, PathBuf::from("/etc/dbtools.yaml"));
    }
}
