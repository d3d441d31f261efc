use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry an async operation over a fixed backoff schedule.
///
/// The operation runs once per schedule entry plus a final attempt, so a
/// schedule of N delays allows N + 1 attempts. Each `delays[i]` is slept
/// after failure i. Schedules stay short here: provider calls run inside
/// a request and the turn timeout bounds the whole sequence.
///
/// # Returns
/// The first successful result, or the last error once the schedule is
/// exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(mut operation: F, delays: &[Duration]) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = delays.len() + 1;

    for (i, delay) in delays.iter().enumerate() {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!(
                    "Request failed (attempt {}/{attempts}): {e}. Retrying after {:?}...",
                    i + 1,
                    delay
                );
                sleep(*delay).await;
            }
        }
    }

    operation().await
}
