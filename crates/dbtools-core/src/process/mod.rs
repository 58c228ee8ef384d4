//! Managed execution of external vendor tools

pub mod command;
pub mod executor;

pub use command::{CommandSpec, Compression, CREDENTIALS_PLACEHOLDER};
pub use executor::{ExecutionResult, ProcessExecutor, RunOptions, STDERR_TAIL_BYTES};
