//! # Conflict Retry
//!
//! Re-runs a whole commit when it lost an optimistic concurrency race.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Retry on Conflict                                 │
//! │                                                                         │
//! │  attempt ──► Ok ─────────────────────────────────────────► return       │
//! │     │                                                                   │
//! │     └──► Err(ConcurrencyConflict) ──► retries left? ──no──► return Err  │
//! │                    │                        │                           │
//! │                    │                       yes                          │
//! │                    │                        ▼                           │
//! │                    │              sleep(backoff.next_backoff())         │
//! │                    │                        │                           │
//! │                    │                        └──► attempt again          │
//! │     └──► Err(anything else) ─────────────────────────────► return Err   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each attempt must be a complete commit (it re-reads what it needs), since
//! the failed attempt's transaction has already rolled back.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DbResult;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = run once).
    pub max_retries: u32,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Runs the operation once, never retrying.
    pub fn none() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Runs `operation`, re-running it while it fails with a retryable error.
///
/// ## Example
/// ```rust,ignore
/// let receipt = retry_on_conflict(RetryPolicy::default(), || {
///     db.sales().checkout(&session, request.clone())
/// })
/// .await?;
/// ```
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut retry_count = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if retry_count > 0 {
                    debug!(retries = retry_count, "Commit succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retry_count < policy.max_retries => {
                retry_count += 1;

                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(error = %err, attempt = retry_count, ?duration, "Conflict, retrying commit");
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::cell::Cell;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = Cell::new(0);
        let result = retry_on_conflict(fast(3), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(DbError::conflict("Product", "p1"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Cell::new(0);
        let result: DbResult<()> = retry_on_conflict(fast(2), || {
            calls.set(calls.get() + 1);
            async { Err(DbError::conflict("Product", "p1")) }
        })
        .await;

        assert!(matches!(result, Err(DbError::ConcurrencyConflict { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_rule_violations_are_not_retried() {
        let calls = Cell::new(0);
        let result: DbResult<()> = retry_on_conflict(fast(5), || {
            calls.set(calls.get() + 1);
            async { Err(DbError::core(koperasi_core::CoreError::EmptyCart)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
