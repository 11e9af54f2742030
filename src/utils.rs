// ABOUTME: Shared helpers for retrying transient failures
// ABOUTME: Used by the connection provider for its liveness check

use anyhow::Result;
use std::time::Duration;

/// Retry an async operation with exponential backoff
///
/// Each retry doubles the delay. `max_retries` counts retries after the first
/// attempt, so `0` runs the operation exactly once.
///
/// Returns the first successful result or the last error once retries are
/// exhausted.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use std::time::Duration;
/// # use table_replicator::utils::retry_with_backoff;
/// # async fn example() -> Result<()> {
/// let rows = retry_with_backoff(
///     || async { Ok(42) },
///     2,
///     Duration::from_millis(500),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}: {:#}",
                    attempt,
                    max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
