//! Retry harness for the long-running loops.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs `task` until it succeeds or fails `count` times in a row, pausing
/// `pause` between attempts. The consecutive-failure counter resets whenever
/// the previous failure is older than `max_err_duration`. Cancellation ends
/// the retries immediately with the last error.
pub async fn retry_with_count<F, Fut, E>(
    count: u32,
    pause: Duration,
    max_err_duration: Duration,
    cancel: &CancellationToken,
    mut task: F
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display
{
    let mut attempt = 0u32;
    let mut last_err_at = Instant::now();

    loop {
        info!(attempt, "runtime");

        let err = match task().await {
            Ok(()) => return Ok(()),
            Err(err) => err
        };

        if cancel.is_cancelled() {
            return Err(err);
        }

        let now = Instant::now();
        if now.duration_since(last_err_at) > max_err_duration {
            attempt = 0;
        }

        attempt += 1;
        error!(attempt, %err, "task failed");

        if attempt >= count {
            return Err(err);
        }

        last_err_at = now;
        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
