//! Optimistic retry for store commits
//!
//! A conflicting commit writes nothing, so the whole read-compute-commit cycle
//! is simply run again from fresh state after a short backoff.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::{Error, Result};

/// Result of one read-compute-commit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Done(T),
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 disables retrying.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 8,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

/// Run `operation` until it completes or conflicts more than `max_retries` times.
///
/// **Backoff:** starts at `initial_backoff`, doubles per conflict, capped at
/// `max_backoff`, with up to 50% random jitter so colliding writers spread out.
/// Errors other than a conflict are returned immediately.
pub async fn retry_on_conflict<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let start_time = Instant::now();
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await? {
            Attempt::Done(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation committed after retry"
                    );
                }
                return Ok(result);
            }
            Attempt::Conflict => {
                if attempt > policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Giving up: concurrent updates kept conflicting"
                    );
                    return Err(Error::ConcurrentUpdateFailed { attempts: attempt });
                }

                let jitter = rand::rng().random_range(0.0..0.5);
                let delay = backoff.mul_f64(1.0 + jitter).min(policy.max_backoff);

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "Concurrent update conflict, will retry after backoff"
                );

                tokio::time::sleep(delay).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairjudge_core::EngineError;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_conflict("test_op", &fast_policy(3), || async {
            Ok::<_, Error>(Attempt::Done(42))
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_conflicts() {
        let mut attempts = 0;

        let result = retry_on_conflict("test_op", &fast_policy(5), || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Ok::<_, Error>(Attempt::Conflict)
                } else {
                    Ok(Attempt::Done(current))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut attempts = 0;

        let result: Result<()> = retry_on_conflict("test_op", &fast_policy(2), || {
            attempts += 1;
            async { Ok::<Attempt<()>, Error>(Attempt::Conflict) }
        })
        .await;

        assert!(matches!(result, Err(Error::ConcurrentUpdateFailed { attempts: 3 })));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_other_errors_fail_immediately() {
        let mut attempts = 0;

        let result: Result<()> = retry_on_conflict("test_op", &fast_policy(5), || {
            attempts += 1;
            async { Err::<Attempt<()>, Error>(EngineError::NotYetJudged("c1".into()).into()) }
        })
        .await;

        assert!(matches!(result, Err(Error::Engine(EngineError::NotYetJudged(_)))));
        assert_eq!(attempts, 1);
    }
}
