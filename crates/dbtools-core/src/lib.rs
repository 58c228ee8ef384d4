//! db-tools Core Library
//!
//! This crate provides backup and restore orchestration for multiple
//! database engines through their vendor command-line tools: per-engine
//! command construction, supervised subprocess execution with streaming
//! I/O, and an on-disk backup repository with retention.

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod operation;
pub mod process;
pub mod storage;

// Re-export commonly used types
pub use config::{ConnectionConfig, DbToolsConfig, ResolvedConnection, ToolPaths};
pub use connection::{ConnectionDescriptor, EngineKind};
pub use engine::{Backuper, BackuperFactory, Restorer, RestorerFactory};
pub use error::{DbToolsError, DbToolsResult};
pub use operation::{
    BackupOperation, BackupReport, OperationState, RestoreOperation, RestoreReport,
};
pub use process::{CommandSpec, Compression, ExecutionResult, ProcessExecutor, RunOptions};
pub use storage::{BackupEntry, PruneReport, RetentionPolicy, Storage};
