//! Error types for db-tools

use thiserror::Error;

/// Result type alias for db-tools operations
pub type DbToolsResult<T> = Result<T, DbToolsError>;

/// Main error type for db-tools
#[derive(Error, Debug, Clone)]
pub enum DbToolsError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or incomplete connection descriptor
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// No registered strategy supports the descriptor's engine
    #[error("Unsupported database engine: {kind}")]
    UnsupportedEngine { kind: String },

    /// Missing backup artifact or path
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External tool exceeded the configured timeout
    #[error("Command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// External tool exited with a non-zero status
    #[error("`{program}` exited with code {exit_code}: {stderr_tail}")]
    ExecutionFailed {
        program: String,
        exit_code: i32,
        stderr_tail: String,
    },

    /// External tool could not be started at all
    #[error("Failed to launch `{program}`: {message}")]
    Launch { program: String, message: String },

    /// Backup repository I/O errors (disk full, permission denied, ...)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DbToolsError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new invalid descriptor error
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor(message.into())
    }

    /// Create a new unsupported engine error
    pub fn unsupported_engine(kind: impl Into<String>) -> Self {
        Self::UnsupportedEngine { kind: kind.into() }
    }

    /// Create a new not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new timeout error
    pub const fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create a new launch error
    pub fn launch(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Launch {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// True for the two outcomes produced by the kill sequence
    pub const fn is_interruption(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}

impl From<std::io::Error> for DbToolsError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for DbToolsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {}", error))
    }
}
