//! End-to-end backup and restore operations
//!
//! Vendor tools are not available in the test environment, so these
//! tests register shell-backed strategies and drive the full path:
//! reservation, supervised execution, publication, retention, rollback.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use dbtools_core::connection::{ConnectionDescriptor, EngineKind};
use dbtools_core::engine::{Backuper, BackuperFactory, Restorer, RestorerFactory};
use dbtools_core::error::{DbToolsError, DbToolsResult};
use dbtools_core::operation::{BackupOperation, OperationState, RestoreOperation};
use dbtools_core::process::{CommandSpec, Compression};
use dbtools_core::storage::{RetentionPolicy, Storage};

struct ShellBackuper {
    script: String,
}

impl Backuper for ShellBackuper {
    fn supports(&self, _descriptor: &ConnectionDescriptor) -> bool {
        true
    }

    fn extension(&self) -> &'static str {
        "sql"
    }

    fn tool(&self) -> &str {
        "sh"
    }

    fn dump_command(
        &self,
        _descriptor: &ConnectionDescriptor,
        output: &Path,
        _extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        Ok(CommandSpec::new("sh")
            .arg("-c")
            .arg(&self.script)
            .stdout_to(output))
    }
}

struct ShellRestorer {
    sink: PathBuf,
}

impl Restorer for ShellRestorer {
    fn supports(&self, _descriptor: &ConnectionDescriptor) -> bool {
        true
    }

    fn extension(&self) -> &'static str {
        "sql"
    }

    fn tool(&self) -> &str {
        "sh"
    }

    fn restore_command(
        &self,
        _descriptor: &ConnectionDescriptor,
        input: &Path,
        _extra_args: &[String],
    ) -> DbToolsResult<CommandSpec> {
        Ok(CommandSpec::new("sh")
            .arg("-c")
            .arg("cat > \"$RESTORE_SINK\"")
            .env("RESTORE_SINK", self.sink.to_string_lossy())
            .stdin_from(input))
    }
}

fn descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor {
        kind: EngineKind::Postgres,
        host: None,
        port: None,
        username: None,
        password: None,
        database: "app".to_string(),
    }
}

fn backupers(script: &str) -> Arc<BackuperFactory> {
    Arc::new(BackuperFactory::new(vec![Arc::new(ShellBackuper {
        script: script.to_string(),
    })]))
}

fn restorers(sink: PathBuf) -> Arc<RestorerFactory> {
    Arc::new(RestorerFactory::new(vec![Arc::new(ShellRestorer { sink })]))
}

#[tokio::test]
async fn test_backup_publishes_artifact() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());

    let mut operation =
        BackupOperation::new(descriptor(), storage.clone(), backupers("printf 'dump-data'"));
    let report = operation.run().await.unwrap();

    assert_eq!(operation.state(), OperationState::Succeeded);
    assert_eq!(report.bytes_streamed, 9);
    assert!(report.entry.filename.starts_with("backup_"));
    assert!(report.entry.filename.ends_with(".sql"));
    assert!(report.pruned.is_none());

    let listed = storage.list_backups().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].size_bytes, 9);

    // no temporary left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_failed_backup_leaves_nothing_visible() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());

    let mut operation = BackupOperation::new(
        descriptor(),
        storage.clone(),
        backupers("printf 'partial'; exit 3"),
    );
    let err = operation.run().await.unwrap_err();

    assert!(matches!(
        err,
        DbToolsError::ExecutionFailed { exit_code: 3, .. }
    ));
    assert_eq!(operation.state(), OperationState::Failed);
    assert!(storage.list_backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backup_timeout_reports_timed_out_state() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());

    let mut operation = BackupOperation::new(descriptor(), storage.clone(), backupers("sleep 30"))
        .timeout(Duration::from_millis(150))
        .grace(Duration::from_millis(100));
    let err = operation.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::Timeout { .. }));
    assert_eq!(operation.state(), OperationState::TimedOut);
    assert!(storage.list_backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backup_cancellation_reports_cancelled_state() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut operation = BackupOperation::new(descriptor(), storage.clone(), backupers("sleep 30"))
        .cancel(cancel);
    let err = operation.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::Cancelled));
    assert_eq!(operation.state(), OperationState::Cancelled);
    assert!(storage.list_backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_engine_fails_before_touching_storage() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("repo"));

    let mut operation = BackupOperation::new(
        descriptor(),
        storage,
        Arc::new(BackuperFactory::new(Vec::new())),
    );
    let err = operation.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::UnsupportedEngine { .. }));
    assert_eq!(operation.state(), OperationState::Failed);
    // the repository directory was never even created
    assert!(!dir.path().join("repo").exists());
}

#[tokio::test]
async fn test_compressed_backup_restores_identically() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("repo"));
    let sink = dir.path().join("restored.sql");

    let mut backup = BackupOperation::new(
        descriptor(),
        storage.clone(),
        backupers("printf 'CREATE TABLE t;'"),
    )
    .compression(Compression::Gzip);
    let report = backup.run().await.unwrap();
    assert!(report.entry.filename.ends_with(".sql.gz"));

    // no filename given picks the newest matching candidate
    let mut restore = RestoreOperation::new(descriptor(), storage, restorers(sink.clone()));
    let report = restore.run().await.unwrap();

    assert_eq!(restore.state(), OperationState::Succeeded);
    assert!(report.filename.ends_with(".sql.gz"));
    assert_eq!(report.bytes_streamed, 15);
    assert_eq!(std::fs::read_to_string(&sink).unwrap(), "CREATE TABLE t;");
}

#[tokio::test]
async fn test_restore_with_no_candidates_reports_repository_path() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());

    let mut restore = RestoreOperation::new(
        descriptor(),
        storage,
        restorers(dir.path().join("sink")),
    );
    let err = restore.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::NotFound(_)));
    assert!(err.to_string().contains(dir.path().to_str().unwrap()));
}

#[tokio::test]
async fn test_restore_rejects_mismatched_artifact() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());
    std::fs::write(dir.path().join("backup_2024-03-20_10-30-00.archive"), b"x").unwrap();

    let mut restore = RestoreOperation::new(
        descriptor(),
        storage,
        restorers(dir.path().join("sink")),
    )
    .filename("backup_2024-03-20_10-30-00.archive");
    let err = restore.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::InvalidInput(_)));
}

#[tokio::test]
async fn test_cleanup_prunes_after_success() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());

    for _ in 0..3 {
        let mut operation =
            BackupOperation::new(descriptor(), storage.clone(), backupers("printf 'x'")).cleanup(
                RetentionPolicy {
                    keep_last: Some(2),
                    max_age: None,
                },
            );
        operation.run().await.unwrap();
    }

    assert_eq!(storage.list_backups().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_file_database_backup_requires_existing_file() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("repo"));
    let missing = dir.path().join("missing.db");

    let target = ConnectionDescriptor {
        kind: EngineKind::Sqlite,
        host: None,
        port: None,
        username: None,
        password: None,
        database: missing.to_string_lossy().into_owned(),
    };

    let mut operation = BackupOperation::new(target, storage, backupers("printf 'x'"));
    let err = operation.run().await.unwrap_err();
    assert!(matches!(err, DbToolsError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_file_restore_rolls_back_original() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("repo"));
    std::fs::create_dir_all(dir.path().join("repo")).unwrap();
    std::fs::write(
        dir.path().join("repo").join("backup_2024-03-20_10-30-00.sql"),
        b"does not matter",
    )
    .unwrap();

    let database = dir.path().join("live.db");
    std::fs::write(&database, b"precious rows").unwrap();

    let target = ConnectionDescriptor {
        kind: EngineKind::Sqlite,
        host: None,
        port: None,
        username: None,
        password: None,
        database: database.to_string_lossy().into_owned(),
    };

    // restorer that dies halfway through
    struct FailingRestorer;
    impl Restorer for FailingRestorer {
        fn supports(&self, _descriptor: &ConnectionDescriptor) -> bool {
            true
        }
        fn extension(&self) -> &'static str {
            "sql"
        }
        fn tool(&self) -> &str {
            "sh"
        }
        fn restore_command(
            &self,
            _descriptor: &ConnectionDescriptor,
            input: &Path,
            _extra_args: &[String],
        ) -> DbToolsResult<CommandSpec> {
            Ok(CommandSpec::new("sh")
                .arg("-c")
                .arg("exit 9")
                .stdin_from(input))
        }
    }

    let mut restore = RestoreOperation::new(
        target,
        storage,
        Arc::new(RestorerFactory::new(vec![Arc::new(FailingRestorer)])),
    );
    let err = restore.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::ExecutionFailed { .. }));
    assert_eq!(restore.state(), OperationState::Failed);
    // the pre-restore database is back in place
    assert_eq!(std::fs::read(&database).unwrap(), b"precious rows");
}

#[tokio::test]
async fn test_failed_command_build_leaves_database_in_place() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("repo"));
    std::fs::create_dir_all(dir.path().join("repo")).unwrap();
    std::fs::write(
        dir.path().join("repo").join("backup_2024-03-20_10-30-00.sql"),
        b"does not matter",
    )
    .unwrap();

    let database = dir.path().join("live.db");
    std::fs::write(&database, b"precious rows").unwrap();

    let target = ConnectionDescriptor {
        kind: EngineKind::Sqlite,
        host: None,
        port: None,
        username: None,
        password: None,
        database: database.to_string_lossy().into_owned(),
    };

    // restorer that cannot even produce a command
    struct RefusingRestorer;
    impl Restorer for RefusingRestorer {
        fn supports(&self, _descriptor: &ConnectionDescriptor) -> bool {
            true
        }
        fn extension(&self) -> &'static str {
            "sql"
        }
        fn tool(&self) -> &str {
            "sh"
        }
        fn restore_command(
            &self,
            _descriptor: &ConnectionDescriptor,
            _input: &Path,
            _extra_args: &[String],
        ) -> DbToolsResult<CommandSpec> {
            Err(DbToolsError::invalid_input("no restore path for this target"))
        }
    }

    let mut restore = RestoreOperation::new(
        target,
        storage,
        Arc::new(RestorerFactory::new(vec![Arc::new(RefusingRestorer)])),
    );
    let err = restore.run().await.unwrap_err();

    assert!(matches!(err, DbToolsError::InvalidInput(_)));
    assert_eq!(restore.state(), OperationState::Failed);
    // the database was never moved aside
    assert_eq!(std::fs::read(&database).unwrap(), b"precious rows");
    assert!(!dir.path().join("live.db.bak").exists());
}
