use std::{future::Future, time::Duration};

use super::contracts::BackendError;

const QUERY_RETRY_SCHEDULED: &str = "QUERY_RETRY_SCHEDULED";
const QUERY_RETRY_EXHAUSTED: &str = "QUERY_RETRY_EXHAUSTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Last backend error plus the number of attempts spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub error: BackendError,
    pub attempts: usize,
}

/// Runs `call` until it succeeds, fails permanently, or the policy runs out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < attempts => {
                tracing::warn!(
                    code = QUERY_RETRY_SCHEDULED,
                    operation,
                    attempt,
                    error = %error,
                    "query failed; retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(
                        code = QUERY_RETRY_EXHAUSTED,
                        operation,
                        attempts = attempt,
                        error = %error,
                        "query failed; giving up"
                    );
                }
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicUsize::new(0);

        let result = with_retry(&instant(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BackendError::Unavailable)
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = with_retry(&instant(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Unavailable)
        })
        .await;

        assert_eq!(
            result,
            Err(RetryFailure {
                error: BackendError::Unavailable,
                attempts: 3
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = with_retry(&instant(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Unauthorized)
        })
        .await;

        assert_eq!(result.map_err(|failure| failure.attempts), Err(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
