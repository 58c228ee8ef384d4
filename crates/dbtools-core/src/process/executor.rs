//! Supervised execution of one vendor tool invocation
//!
//! The executor owns the child process for exactly one [`run`] call: it
//! wires the child's stdio to repository files through blocking pump tasks
//! (optionally through the gzip filter), keeps a bounded stderr tail for
//! diagnostics, and supervises completion against an optional monotonic
//! deadline and a cancellation token. Timeout and cancellation share the
//! same termination sequence: SIGTERM, a grace period, then SIGKILL.
//!
//! [`run`]: ProcessExecutor::run

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::{CommandSpec, Compression};
use crate::config::defaults;
use crate::error::{DbToolsError, DbToolsResult};

/// How much stderr is retained for diagnostics
pub const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Per-run execution knobs
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Deadline for the whole invocation; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Time between SIGTERM and SIGKILL during termination
    pub grace: Duration,
    /// Cooperative cancellation; same termination sequence as timeout
    pub cancel: CancellationToken,
    /// Filter between the child's pipe and the file
    pub compression: Compression,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            grace: defaults::grace_period(),
            cancel: CancellationToken::new(),
            compression: Compression::None,
        }
    }
}

impl RunOptions {
    /// Set the execution deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the SIGTERM-to-SIGKILL grace period
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Supervise against an externally owned cancellation token
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the streaming filter
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// What a completed (exit status zero) invocation looked like
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code reported by the child
    pub exit_code: i32,
    /// Wall time of the whole invocation
    pub duration: Duration,
    /// Bytes moved through the stdio pumps, before compression
    pub bytes_streamed: u64,
    /// Bounded tail of stderr; vendor tools put warnings here
    pub stderr_tail: String,
}

enum WaitOutcome {
    Exited(std::process::ExitStatus),
    TimedOut(Duration),
    Cancelled,
}

/// Runs one [`CommandSpec`] to completion or termination
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Execute the command, mediating all I/O
    ///
    /// Returns `Ok` only for a zero exit status with healthy stream pumps.
    /// Every other outcome maps onto the error taxonomy: spawn failures to
    /// [`Launch`](DbToolsError::Launch), deadline expiry to
    /// [`Timeout`](DbToolsError::Timeout), token cancellation to
    /// [`Cancelled`](DbToolsError::Cancelled), non-zero exits to
    /// [`ExecutionFailed`](DbToolsError::ExecutionFailed).
    pub async fn run(spec: &CommandSpec, options: &RunOptions) -> DbToolsResult<ExecutionResult> {
        let start = tokio::time::Instant::now();

        // Materialize the ephemeral credentials file before argument
        // resolution. The guard drops (and the file disappears) when this
        // function returns, on every path.
        let credentials_guard = match &spec.credentials {
            Some(contents) => Some(Self::write_credentials_file(contents)?),
            None => None,
        };
        let args = spec.resolved_args(credentials_guard.as_ref().map(|f| f.path()));

        let mut cmd = Command::new(&spec.program);
        cmd.args(&args)
            .stdin(if spec.stdin_file.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if spec.stdout_file.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        debug!(command = %spec.display_line(), "launching vendor tool");
        let mut child = cmd
            .spawn()
            .map_err(|e| DbToolsError::launch(&spec.program, e.to_string()))?;

        let stdout_pump = match (&spec.stdout_file, child.stdout.take()) {
            (Some(path), Some(stdout)) => Some(Self::spawn_to_file_pump(
                SyncIoBridge::new(stdout),
                path.clone(),
                options.compression,
            )),
            _ => None,
        };
        let stdin_pump = match (&spec.stdin_file, child.stdin.take()) {
            (Some(path), Some(stdin)) => Some(Self::spawn_from_file_pump(
                SyncIoBridge::new(stdin),
                path.clone(),
                options.compression,
            )),
            _ => None,
        };
        let stderr_task = child.stderr.take().map(Self::spawn_stderr_tail);

        let outcome = if let Some(limit) = options.timeout {
            tokio::select! {
                result = child.wait() => WaitOutcome::Exited(
                    result.map_err(|e| DbToolsError::storage(format!(
                        "wait on `{}` failed: {}", spec.program, e
                    )))?,
                ),
                _ = tokio::time::sleep(limit) => WaitOutcome::TimedOut(limit),
                _ = options.cancel.cancelled() => WaitOutcome::Cancelled,
            }
        } else {
            tokio::select! {
                result = child.wait() => WaitOutcome::Exited(
                    result.map_err(|e| DbToolsError::storage(format!(
                        "wait on `{}` failed: {}", spec.program, e
                    )))?,
                ),
                _ = options.cancel.cancelled() => WaitOutcome::Cancelled,
            }
        };

        match outcome {
            WaitOutcome::TimedOut(limit) => {
                warn!(
                    command = %spec.display_line(),
                    timeout_secs = limit.as_secs(),
                    "vendor tool exceeded its deadline; terminating"
                );
                Self::terminate(&mut child, options.grace).await;
                Self::settle_pumps(stdout_pump, stdin_pump).await.ok();
                Self::settle_stderr(stderr_task).await;
                Err(DbToolsError::timeout(limit.as_secs()))
            }
            WaitOutcome::Cancelled => {
                info!(command = %spec.display_line(), "cancellation requested; terminating");
                Self::terminate(&mut child, options.grace).await;
                Self::settle_pumps(stdout_pump, stdin_pump).await.ok();
                Self::settle_stderr(stderr_task).await;
                Err(DbToolsError::Cancelled)
            }
            WaitOutcome::Exited(status) => {
                let pump_result = Self::settle_pumps(stdout_pump, stdin_pump).await;
                let stderr_tail = Self::settle_stderr(stderr_task).await;

                if !status.success() {
                    let exit_code = status.code().unwrap_or(-1);
                    warn!(
                        command = %spec.display_line(),
                        exit_code,
                        "vendor tool failed"
                    );
                    return Err(DbToolsError::ExecutionFailed {
                        program: spec.program.clone(),
                        exit_code,
                        stderr_tail,
                    });
                }

                // A broken pump invalidates the run even on a clean exit;
                // the output is not trustworthy.
                let bytes_streamed = pump_result.map_err(|e| {
                    DbToolsError::storage(format!(
                        "streaming for `{}` failed: {}",
                        spec.program, e
                    ))
                })?;

                let duration = start.elapsed();
                debug!(
                    command = %spec.display_line(),
                    duration_ms = duration.as_millis() as u64,
                    bytes_streamed,
                    "vendor tool finished"
                );
                Ok(ExecutionResult {
                    exit_code: status.code().unwrap_or(0),
                    duration,
                    bytes_streamed,
                    stderr_tail,
                })
            }
        }
    }

    fn write_credentials_file(contents: &str) -> DbToolsResult<tempfile::NamedTempFile> {
        // NamedTempFile is created 0600 on Unix
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| DbToolsError::storage(format!("credentials file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| DbToolsError::storage(format!("credentials file: {}", e)))?;
        Ok(file)
    }

    /// child stdout → (gzip →) file
    fn spawn_to_file_pump(
        mut source: SyncIoBridge<tokio::process::ChildStdout>,
        path: std::path::PathBuf,
        compression: Compression,
    ) -> JoinHandle<std::io::Result<u64>> {
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&path)?;
            match compression {
                Compression::Gzip => {
                    let mut encoder =
                        flate2::write::GzEncoder::new(file, flate2::Compression::default());
                    let bytes = std::io::copy(&mut source, &mut encoder)?;
                    encoder.finish()?.sync_all()?;
                    Ok(bytes)
                }
                Compression::None => {
                    let mut file = file;
                    let bytes = std::io::copy(&mut source, &mut file)?;
                    file.sync_all()?;
                    Ok(bytes)
                }
            }
        })
    }

    /// file (→ gunzip) → child stdin
    fn spawn_from_file_pump(
        mut sink: SyncIoBridge<tokio::process::ChildStdin>,
        path: std::path::PathBuf,
        compression: Compression,
    ) -> JoinHandle<std::io::Result<u64>> {
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            let bytes = match compression {
                Compression::Gzip => {
                    let mut decoder = flate2::read::GzDecoder::new(file);
                    std::io::copy(&mut decoder, &mut sink)?
                }
                Compression::None => {
                    let mut file = file;
                    std::io::copy(&mut file, &mut sink)?
                }
            };
            // close the pipe so the child sees EOF
            sink.shutdown()?;
            Ok(bytes)
        })
    }

    fn spawn_stderr_tail(mut stderr: ChildStderr) -> JoinHandle<String> {
        tokio::spawn(async move {
            let mut tail: Vec<u8> = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > STDERR_TAIL_BYTES {
                            let cut = tail.len() - STDERR_TAIL_BYTES;
                            tail.drain(..cut);
                        }
                    }
                }
            }
            String::from_utf8_lossy(&tail).trim().to_string()
        })
    }

    async fn settle_pumps(
        stdout_pump: Option<JoinHandle<std::io::Result<u64>>>,
        stdin_pump: Option<JoinHandle<std::io::Result<u64>>>,
    ) -> std::io::Result<u64> {
        let mut bytes = 0u64;
        for pump in [stdout_pump, stdin_pump].into_iter().flatten() {
            match pump.await {
                Ok(Ok(n)) => bytes += n,
                Ok(Err(e)) => return Err(e),
                Err(join_err) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        join_err.to_string(),
                    ));
                }
            }
        }
        Ok(bytes)
    }

    async fn settle_stderr(task: Option<JoinHandle<String>>) -> String {
        match task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }

    /// SIGTERM, wait out the grace period, then SIGKILL
    async fn terminate(child: &mut Child, grace: Duration) {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(raw) = child.id() {
                let pid = Pid::from_raw(raw as i32);
                match kill(pid, Signal::SIGTERM) {
                    Ok(()) => {
                        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                            debug!(pid = raw, "child exited within grace period");
                            return;
                        }
                        debug!(pid = raw, "grace period expired; sending SIGKILL");
                    }
                    Err(Errno::ESRCH) => return,
                    Err(e) => debug!(pid = raw, error = %e, "SIGTERM failed"),
                }
            }
        }
        #[cfg(not(unix))]
        let _ = grace;
        let _ = child.kill().await;
    }
}
