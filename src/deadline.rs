//! Deadlines for blocking guest operations.
//!
//! Guest calls cannot be interrupted from the outside. A deadline only
//! stops waiting: the abandoned operation keeps running on tokio's blocking
//! pool until it finishes, and its instance is released then.

use std::time::Duration;

use tracing::warn;

use tagbridge_common::BridgeError;

/// Run `op` on the blocking pool, giving up after `timeout`.
///
/// # Errors
///
/// - [`BridgeError::ExecutionTimeout`] if `op` did not finish in time.
/// - [`BridgeError::ShutDown`] if the tokio runtime cancelled the task.
/// - Whatever `op` returned otherwise.
///
/// # Panics
///
/// Re-raises a panic from `op` on the calling task.
pub async fn run_blocking<T, F>(timeout: Duration, op: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> Result<T, BridgeError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(op);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
        Ok(Err(_)) => Err(BridgeError::ShutDown),
        Err(_) => {
            let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(duration_ms, "Operation exceeded its deadline; abandoning it");
            Err(BridgeError::ExecutionTimeout { duration_ms })
        }
    }
}
