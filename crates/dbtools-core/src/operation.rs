//! Backup and restore orchestration
//!
//! One operation ties the repository, the strategy registries and the
//! process executor together. The CLI only ever talks to this layer.
//!
//! Every operation walks the same state machine: `Pending → Running →
//! {Succeeded, Failed, TimedOut, Cancelled}`. On any failure the
//! reserved temporary artifact is discarded, so a half-written dump is
//! never visible to listings.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::defaults;
use crate::connection::ConnectionDescriptor;
use crate::engine::{BackuperFactory, RestorerFactory};
use crate::error::{DbToolsError, DbToolsResult};
use crate::process::{Compression, ProcessExecutor, RunOptions};
use crate::storage::{BackupEntry, PruneReport, RetentionPolicy, Storage};

/// Lifecycle of one backup or restore operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    fn from_failure(error: &DbToolsError) -> Self {
        match error {
            DbToolsError::Timeout { .. } => Self::TimedOut,
            DbToolsError::Cancelled => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of a successful backup
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub entry: BackupEntry,
    pub state: OperationState,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Dump bytes streamed out of the vendor tool, before compression
    pub bytes_streamed: u64,
    /// Post-success retention pass, when cleanup ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pruned: Option<PruneReport>,
    /// Set when the artifact published but the retention pass failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_error: Option<String>,
}

/// Outcome of a successful restore
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Artifact that was loaded
    pub filename: String,
    pub state: OperationState,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Dump bytes streamed into the vendor tool, after decompression
    pub bytes_streamed: u64,
}

/// Creates one backup artifact for one database
pub struct BackupOperation {
    descriptor: ConnectionDescriptor,
    storage: Storage,
    backupers: Arc<BackuperFactory>,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    grace: Duration,
    cancel: CancellationToken,
    compression: Compression,
    /// Retention applied after a successful backup; `None` disables cleanup
    retention: Option<RetentionPolicy>,
    state: OperationState,
}

impl BackupOperation {
    pub fn new(
        descriptor: ConnectionDescriptor,
        storage: Storage,
        backupers: Arc<BackuperFactory>,
    ) -> Self {
        Self {
            descriptor,
            storage,
            backupers,
            extra_args: Vec::new(),
            timeout: None,
            grace: defaults::grace_period(),
            cancel: CancellationToken::new(),
            compression: Compression::None,
            retention: None,
            state: OperationState::Pending,
        }
    }

    /// Extra vendor-tool arguments from the connection configuration
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Abort the dump after this long
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Time between SIGTERM and SIGKILL when terminating the tool
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Cooperative cancellation, typically wired to Ctrl-C
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Compress the artifact while writing it
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Prune old artifacts after a successful backup
    pub fn cleanup(mut self, retention: RetentionPolicy) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub async fn run(&mut self) -> DbToolsResult<BackupReport> {
        self.state = OperationState::Running;
        let result = self.execute().await;
        match &result {
            Ok(_) => self.state = OperationState::Succeeded,
            Err(error) => self.state = OperationState::from_failure(error),
        }
        result
    }

    async fn execute(&self) -> DbToolsResult<BackupReport> {
        self.descriptor.validate()?;
        if self.descriptor.kind.is_file_based()
            && !Path::new(&self.descriptor.database).exists()
        {
            return Err(DbToolsError::not_found(format!(
                "database file {}",
                self.descriptor.database
            )));
        }

        // fail fast before anything touches the disk
        let backuper = self.backupers.create(&self.descriptor)?;

        let extension = format!("{}{}", backuper.extension(), self.compression.suffix());
        let reserved = self.storage.reserve(&extension).await?;

        info!(
            database = %self.descriptor.database,
            engine = %self.descriptor.kind,
            artifact = reserved.final_name(),
            "starting backup"
        );

        let spec = match backuper.dump_command(&self.descriptor, reserved.path(), &self.extra_args)
        {
            Ok(spec) => spec,
            Err(error) => {
                reserved.discard().await;
                return Err(error);
            }
        };

        let mut options = RunOptions::default()
            .grace(self.grace)
            .cancel(self.cancel.clone())
            .compression(self.compression);
        if let Some(limit) = self.timeout {
            options = options.timeout(limit);
        }

        match ProcessExecutor::run(&spec, &options).await {
            Ok(result) => {
                let entry = reserved.publish().await?;
                info!(
                    artifact = %entry.filename,
                    bytes = result.bytes_streamed,
                    elapsed = ?result.duration,
                    "backup complete"
                );

                let (pruned, prune_error) = match &self.retention {
                    Some(policy) if !policy.is_unbounded() => {
                        settle_retention(self.storage.prune(policy).await)
                    }
                    _ => (None, None),
                };

                Ok(BackupReport {
                    entry,
                    state: OperationState::Succeeded,
                    duration: result.duration,
                    bytes_streamed: result.bytes_streamed,
                    pruned,
                    prune_error,
                })
            }
            Err(error) => {
                warn!(error = %error, "backup failed, discarding partial artifact");
                reserved.discard().await;
                Err(error)
            }
        }
    }
}

/// Fold the post-publish retention outcome into report fields
///
/// The artifact is already published at this point; a failed retention
/// pass is reported, never propagated.
fn settle_retention(outcome: DbToolsResult<PruneReport>) -> (Option<PruneReport>, Option<String>) {
    match outcome {
        Ok(report) => {
            if !report.deleted.is_empty() {
                info!(
                    deleted = report.deleted.len(),
                    freed_bytes = report.freed_bytes,
                    "cleaned up old backups"
                );
            }
            (Some(report), None)
        }
        Err(error) => {
            warn!(error = %error, "retention pass failed, backup kept");
            (None, Some(error.to_string()))
        }
    }
}

/// Loads one stored artifact back into a database
pub struct RestoreOperation {
    descriptor: ConnectionDescriptor,
    storage: Storage,
    restorers: Arc<RestorerFactory>,
    /// Explicit artifact to load; `None` picks the most recent candidate
    filename: Option<String>,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    grace: Duration,
    cancel: CancellationToken,
    state: OperationState,
}

impl RestoreOperation {
    pub fn new(
        descriptor: ConnectionDescriptor,
        storage: Storage,
        restorers: Arc<RestorerFactory>,
    ) -> Self {
        Self {
            descriptor,
            storage,
            restorers,
            filename: None,
            extra_args: Vec::new(),
            timeout: None,
            grace: defaults::grace_period(),
            cancel: CancellationToken::new(),
            state: OperationState::Pending,
        }
    }

    /// Restore this artifact instead of the most recent one
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Extra vendor-tool arguments from the connection configuration
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Abort the restore after this long
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Time between SIGTERM and SIGKILL when terminating the tool
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Cooperative cancellation, typically wired to Ctrl-C
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub async fn run(&mut self) -> DbToolsResult<RestoreReport> {
        self.state = OperationState::Running;
        let result = self.execute().await;
        match &result {
            Ok(_) => self.state = OperationState::Succeeded,
            Err(error) => self.state = OperationState::from_failure(error),
        }
        result
    }

    async fn execute(&self) -> DbToolsResult<RestoreReport> {
        self.descriptor.validate()?;
        let restorer = self.restorers.create(&self.descriptor)?;

        let (filename, path) = match &self.filename {
            Some(filename) => {
                let path = self.storage.resolve(filename).await?;
                let entry_matches = filename.ends_with(&format!(".{}", restorer.extension()))
                    || filename.ends_with(&format!(".{}.gz", restorer.extension()));
                if !entry_matches {
                    return Err(DbToolsError::invalid_input(format!(
                        "{} is not a .{} artifact, it cannot be restored into a {} database",
                        filename,
                        restorer.extension(),
                        self.descriptor.kind
                    )));
                }
                (filename.clone(), path)
            }
            None => {
                let candidates = self.storage.list_candidates(restorer.extension()).await?;
                let latest = candidates.into_iter().next().ok_or_else(|| {
                    DbToolsError::not_found(format!(
                        "no .{} backup in {}",
                        restorer.extension(),
                        self.storage.storage_path().display()
                    ))
                })?;
                let path = self.storage.resolve(&latest.filename).await?;
                (latest.filename, path)
            }
        };

        let compression = Compression::for_filename(&filename);
        // built up front; nothing fallible may sit between the move-aside
        // below and the rollback arm that undoes it
        let spec = restorer.restore_command(&self.descriptor, &path, &self.extra_args)?;

        info!(
            database = %self.descriptor.database,
            engine = %self.descriptor.kind,
            artifact = %filename,
            "starting restore"
        );

        // replaying SQL into an existing file conflicts with itself, so the
        // current database moves aside first; the .bak is the undo path
        let mut preserved: Option<String> = None;
        if self.descriptor.kind.is_file_based() {
            let target = Path::new(&self.descriptor.database);
            if target.exists() {
                let aside = format!("{}.bak", self.descriptor.database);
                tokio::fs::rename(target, &aside).await?;
                debug!(preserved = %aside, "moved existing database aside");
                preserved = Some(aside);
            }
        }

        let mut options = RunOptions::default()
            .grace(self.grace)
            .cancel(self.cancel.clone())
            .compression(compression);
        if let Some(limit) = self.timeout {
            options = options.timeout(limit);
        }

        match ProcessExecutor::run(&spec, &options).await {
            Ok(result) => {
                info!(
                    artifact = %filename,
                    bytes = result.bytes_streamed,
                    elapsed = ?result.duration,
                    "restore complete"
                );
                Ok(RestoreReport {
                    filename,
                    state: OperationState::Succeeded,
                    duration: result.duration,
                    bytes_streamed: result.bytes_streamed,
                })
            }
            Err(error) => {
                if let Some(aside) = preserved {
                    // put the original back over whatever partial state the
                    // failed replay left behind
                    match tokio::fs::rename(&aside, &self.descriptor.database).await {
                        Ok(()) => info!(database = %self.descriptor.database, "rolled back to pre-restore database"),
                        Err(rename_error) => warn!(
                            preserved = %aside,
                            error = %rename_error,
                            "could not roll back, original database kept aside"
                        ),
                    }
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OperationState::Pending.is_terminal());
        assert!(!OperationState::Running.is_terminal());
        assert!(OperationState::Succeeded.is_terminal());
        assert!(OperationState::Cancelled.is_terminal());
    }

    #[test]
    fn test_failure_state_mapping() {
        assert_eq!(
            OperationState::from_failure(&DbToolsError::timeout(30)),
            OperationState::TimedOut
        );
        assert_eq!(
            OperationState::from_failure(&DbToolsError::Cancelled),
            OperationState::Cancelled
        );
        assert_eq!(
            OperationState::from_failure(&DbToolsError::storage("disk full")),
            OperationState::Failed
        );
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OperationState::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(OperationState::TimedOut.to_string(), "timed out");
    }

    #[test]
    fn test_settle_retention_keeps_prune_report() {
        let report = PruneReport {
            deleted: vec!["backup_2024-03-20_10-30-00.sql".to_string()],
            freed_bytes: 42,
            failures: 0,
        };
        let (pruned, error) = settle_retention(Ok(report));
        assert_eq!(pruned.unwrap().freed_bytes, 42);
        assert!(error.is_none());
    }

    #[test]
    fn test_settle_retention_turns_failure_into_warning() {
        let (pruned, error) = settle_retention(Err(DbToolsError::storage("repository unreadable")));
        assert!(pruned.is_none());
        assert!(error.unwrap().contains("repository unreadable"));
    }
}
