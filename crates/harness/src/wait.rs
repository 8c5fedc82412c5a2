//! Bounded polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::HarnessError;

/// Polls `check` every `interval` until it yields `Some`, or `timeout` passes.
///
/// Returns `Ok(None)` on timeout so callers can attach what they were waiting
/// for. Errors from `check` end the wait immediately.
pub(crate) async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<Option<T>, HarnessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, HarnessError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(Some(value));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}
