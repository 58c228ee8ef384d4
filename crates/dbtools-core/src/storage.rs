//! Backup repository management
//!
//! [`Storage`] owns one directory of backup artifacts. Artifacts are named
//! `backup_{YYYY-MM-DD_HH-MM-SS}.{extension}` (UTC), so lexical order of the
//! timestamp field equals chronological order. Writes never target a final
//! name directly: callers [`reserve`](Storage::reserve) a dot-prefixed
//! `.part` path, stream into it, and only a successful
//! [`publish`](ReservedBackup::publish) renames it into place. Listings skip
//! everything that does not match the artifact pattern, so a half-written
//! file is never visible.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DbToolsError, DbToolsResult};

/// Prefix shared by every artifact filename
pub const FILENAME_PREFIX: &str = "backup_";

/// Timestamp layout inside artifact filenames
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const TIMESTAMP_LEN: usize = 19;

/// One stored backup plus its metadata
#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    /// Artifact filename, unique within the repository
    pub filename: String,
    /// Creation time parsed back out of the filename
    pub created_at: DateTime<Utc>,
    /// Size on disk
    pub size_bytes: u64,
}

impl BackupEntry {
    /// Age relative to `now`, as the repository's coarse human label
    /// (largest unit that is at least one: `"1 days"`, `"3 hours"`, ...)
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        let seconds = now
            .signed_duration_since(self.created_at)
            .num_seconds()
            .max(0);
        if seconds >= 86_400 {
            format!("{} days", seconds / 86_400)
        } else if seconds >= 3_600 {
            format!("{} hours", seconds / 3_600)
        } else if seconds >= 60 {
            format!("{} minutes", seconds / 60)
        } else {
            format!("{} seconds", seconds)
        }
    }

    /// Extension carried by this artifact, compression suffix included
    pub fn extension(&self) -> &str {
        self.filename
            .split_once('.')
            .map(|(_, extension)| extension)
            .unwrap_or("")
    }

    /// Whether this artifact carries `extension`, compressed or not
    pub fn matches_extension(&self, extension: &str) -> bool {
        let plain = format!(".{}", extension);
        let gz = format!(".{}.gz", extension);
        self.filename.ends_with(&plain) || self.filename.ends_with(&gz)
    }

    /// True when the artifact was written through the gzip filter
    pub fn is_compressed(&self) -> bool {
        self.filename.ends_with(".gz")
    }
}

/// Count- and/or age-based retention
///
/// Unset fields do not constrain anything; a fully unset policy prunes
/// nothing. When both are set, both apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at most this many artifacts, newest first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_last: Option<usize>,
    /// Delete artifacts older than this
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.keep_last.is_none() && self.max_age.is_none()
    }
}

/// What a prune pass actually did
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Filenames removed
    pub deleted: Vec<String>,
    /// Bytes reclaimed by the removals
    pub freed_bytes: u64,
    /// Deletions that failed and were skipped
    pub failures: usize,
}

/// Handle for an in-progress backup write
///
/// Obtained from [`Storage::reserve`]. The executor streams into
/// [`path`](Self::path); the orchestration layer then either
/// [`publish`](Self::publish)es or [`discard`](Self::discard)s it. If the
/// handle is dropped without doing either, the temporary file is removed.
#[derive(Debug)]
pub struct ReservedBackup {
    root: PathBuf,
    final_name: String,
    temp: Option<PathBuf>,
}

impl ReservedBackup {
    /// Temporary path to write into
    pub fn path(&self) -> &Path {
        // invariant: `temp` is only taken by publish/discard, which consume self
        self.temp.as_deref().unwrap_or(Path::new(""))
    }

    /// Final filename this reservation will publish as (barring collisions)
    pub fn final_name(&self) -> &str {
        &self.final_name
    }

    /// Rename the written temporary into its final, listed name
    pub async fn publish(mut self) -> DbToolsResult<BackupEntry> {
        let temp = match self.temp.take() {
            Some(temp) => temp,
            None => return Err(DbToolsError::storage("reservation already consumed")),
        };

        let (stem, extension) = split_backup_name(&self.final_name).ok_or_else(|| {
            DbToolsError::storage(format!("malformed reserved name `{}`", self.final_name))
        })?;

        // Same-second backups of the same engine land on the same final
        // name; each candidate is claimed with `create_new`, which cannot
        // succeed twice, and a counter is bumped until a claim sticks.
        let mut chosen = self.final_name.clone();
        let mut attempt = 1usize;
        let final_path = loop {
            let candidate = self.root.join(&chosen);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    chosen = format!("{}-{}.{}", stem, attempt, extension);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(error) = tokio::fs::rename(&temp, &final_path).await {
            let _ = tokio::fs::remove_file(&final_path).await;
            return Err(error.into());
        }

        let metadata = tokio::fs::metadata(&final_path).await?;
        let created_at = parse_backup_filename(&chosen).unwrap_or_else(Utc::now);
        info!(artifact = %chosen, size_bytes = metadata.len(), "backup published");

        Ok(BackupEntry {
            filename: chosen,
            created_at,
            size_bytes: metadata.len(),
        })
    }

    /// Remove the temporary file, best-effort
    pub async fn discard(mut self) {
        if let Some(temp) = self.temp.take() {
            match tokio::fs::remove_file(&temp).await {
                Ok(()) => debug!(path = %temp.display(), "discarded partial backup"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %temp.display(), error = %e, "failed to discard partial backup"),
            }
        }
    }
}

impl Drop for ReservedBackup {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            let _ = std::fs::remove_file(temp);
        }
    }
}

/// Owner of the backup repository directory
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root, exactly as configured; for user-facing messages
    pub fn storage_path(&self) -> &Path {
        &self.root
    }

    /// Create the repository directory if it does not exist yet
    pub async fn ensure_root(&self) -> DbToolsResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// All artifacts, newest first
    ///
    /// A missing or empty repository yields an empty list. Files that do not
    /// match the artifact naming pattern (including in-progress `.part`
    /// files) are not artifacts and never appear here.
    pub async fn list_backups(&self) -> DbToolsResult<Vec<BackupEntry>> {
        let mut reader = match tokio::fs::read_dir(&self.root).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            if !item.file_type().await?.is_file() {
                continue;
            }
            let filename = match item.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let Some(created_at) = parse_backup_filename(&filename) else {
                continue;
            };
            let size_bytes = item.metadata().await?.len();
            entries.push(BackupEntry {
                filename,
                created_at,
                size_bytes,
            });
        }

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        debug!(count = entries.len(), root = %self.root.display(), "listed backups");
        Ok(entries)
    }

    /// Artifacts restorable with the given engine extension, newest first
    pub async fn list_candidates(&self, extension: &str) -> DbToolsResult<Vec<BackupEntry>> {
        let mut entries = self.list_backups().await?;
        entries.retain(|entry| entry.matches_extension(extension));
        Ok(entries)
    }

    /// Absolute path of an existing artifact
    pub async fn resolve(&self, filename: &str) -> DbToolsResult<PathBuf> {
        if filename.contains(['/', '\\']) {
            return Err(DbToolsError::invalid_input(format!(
                "backup filename `{}` must not contain path separators",
                filename
            )));
        }
        let path = self.root.join(filename);
        if !tokio::fs::try_exists(&path).await? {
            return Err(DbToolsError::not_found(format!(
                "backup file `{}` does not exist in {}",
                filename,
                self.root.display()
            )));
        }
        Ok(path)
    }

    /// Reserve a unique temporary path for a new artifact
    ///
    /// The temporary lives next to its future final name so the publishing
    /// rename stays on one filesystem. Uniqueness comes from a random token,
    /// concurrent reservations never collide.
    pub async fn reserve(&self, extension: &str) -> DbToolsResult<ReservedBackup> {
        self.ensure_root().await?;
        let final_name = backup_filename(Utc::now(), extension);
        let token = uuid::Uuid::new_v4().simple().to_string();
        let temp = self.root.join(format!(".{}.{}.part", final_name, token));
        debug!(temp = %temp.display(), "reserved backup path");
        Ok(ReservedBackup {
            root: self.root.clone(),
            final_name,
            temp: Some(temp),
        })
    }

    /// Artifacts the policy would delete right now, oldest victims last
    pub async fn plan_prune(&self, policy: &RetentionPolicy) -> DbToolsResult<Vec<BackupEntry>> {
        if policy.is_unbounded() {
            return Ok(Vec::new());
        }
        let entries = self.list_backups().await?;
        let now = Utc::now();

        let mut victims: Vec<BackupEntry> = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let beyond_count = policy.keep_last.is_some_and(|keep| index >= keep);
            let beyond_age = policy.max_age.is_some_and(|max_age| {
                let age = now.signed_duration_since(entry.created_at);
                age.num_seconds().max(0) as u64 > max_age.as_secs()
            });
            if beyond_count || beyond_age {
                victims.push(entry);
            }
        }
        Ok(victims)
    }

    /// Delete artifacts beyond the retention policy, best-effort
    ///
    /// A failed deletion is logged and counted; the remaining victims are
    /// still processed.
    pub async fn prune(&self, policy: &RetentionPolicy) -> DbToolsResult<PruneReport> {
        let victims = self.plan_prune(policy).await?;
        let mut report = PruneReport::default();

        for victim in victims {
            match tokio::fs::remove_file(self.root.join(&victim.filename)).await {
                Ok(()) => {
                    info!(artifact = %victim.filename, "pruned backup");
                    report.freed_bytes += victim.size_bytes;
                    report.deleted.push(victim.filename);
                }
                Err(e) => {
                    warn!(artifact = %victim.filename, error = %e, "failed to prune backup");
                    report.failures += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Compose an artifact filename for the given creation time
pub fn backup_filename(at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}{}.{}",
        FILENAME_PREFIX,
        at.format(TIMESTAMP_FORMAT),
        extension
    )
}

/// Parse the creation time back out of an artifact filename
///
/// Returns `None` for anything that is not an artifact of this repository.
pub fn parse_backup_filename(filename: &str) -> Option<DateTime<Utc>> {
    let stem = filename.strip_prefix(FILENAME_PREFIX)?;
    if stem.len() <= TIMESTAMP_LEN {
        return None;
    }
    // after the timestamp comes either the extension dot or a collision counter
    if !matches!(stem.as_bytes()[TIMESTAMP_LEN], b'.' | b'-') {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(&stem[..TIMESTAMP_LEN], TIMESTAMP_FORMAT).ok()?;
    Some(naive.and_utc())
}

fn split_backup_name(filename: &str) -> Option<(&str, &str)> {
    let dot = filename.find('.')?;
    Some((&filename[..dot], &filename[dot + 1..]))
}
