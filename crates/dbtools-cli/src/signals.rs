//! Ctrl-C wiring for long-running operations

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation token that trips on the first Ctrl-C
///
/// The first signal requests a graceful stop: the running vendor tool is
/// terminated and partial artifacts are cleaned up. A second Ctrl-C
/// aborts the process immediately.
pub fn cancellation_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("received Ctrl-C, cancelling current operation");
            token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    cancel
}
