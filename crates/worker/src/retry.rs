//! Retry with exponential backoff around whole synchronization runs.
//!
//! Runs are idempotent through the identity mapping store, so a failed run
//! is retried from the beginning rather than resumed.

use std::future::Future;
use std::time::Duration;

use syncbridge_core::sync_status::SyncStats;
use syncbridge_pipeline::{EntitySynchronizer, SyncError};
use tokio_util::sync::CancellationToken;

/// Tunable parameters for retrying failed runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay following `current`, clamped to [`max_delay`](Self::max_delay).
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }
}

/// Call `attempt` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is reached.
///
/// Cancellation while waiting between attempts returns the last error.
pub async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    entity_type: &str,
    mut attempt: F,
) -> Result<SyncStats, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SyncStats, SyncError>>,
{
    let mut delay = policy.initial_delay.min(policy.max_delay);
    let mut number = 0u32;

    loop {
        number += 1;
        let err = match attempt().await {
            Ok(stats) => return Ok(stats),
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::error!(entity_type, error = %err, "Sync failed, not retrying");
            return Err(err);
        }
        if number >= policy.max_attempts {
            tracing::error!(entity_type, attempts = number, error = %err, "Sync failed after all attempts");
            return Err(err);
        }

        tracing::warn!(
            entity_type,
            attempt = number,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Sync attempt failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(entity_type, "Retry cancelled");
                return Err(err);
            }
            _ = tokio::time::sleep(delay) => {}
        }
        delay = policy.next_delay(delay);
    }
}

/// Synchronize one entity type under `policy`.
pub async fn sync_entity(
    sync: &EntitySynchronizer,
    entity_type: &str,
    incremental: bool,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<SyncStats, SyncError> {
    run_with_retry(policy, cancel, entity_type, move || {
        sync.run_sync(entity_type, incremental)
    })
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn next_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(Duration::from_secs(5)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn next_delay_clamps_to_max() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(Duration::from_secs(200)),
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_policy(3), &CancellationToken::new(), "widget", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(SyncError::Failure("db down".into()))
                } else {
                    Ok(SyncStats::default())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_policy(3), &CancellationToken::new(), "widget", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Failure("db down".into())) }
        })
        .await;

        assert_matches!(result, Err(SyncError::Failure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn configuration_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_policy(5), &CancellationToken::new(), "widget", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Configuration("no config".into())) }
        })
        .await;

        assert_matches!(result, Err(SyncError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            ..fast_policy(3)
        };
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&policy, &cancel, "widget", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Failure("db down".into())) }
        })
        .await;

        assert_matches!(result, Err(SyncError::Failure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
