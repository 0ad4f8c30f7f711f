use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Bounded retry with linear backoff, each attempt capped by a timeout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub timeout_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1000,
            timeout_ms: 30_000,
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(attempt as u64))
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Runs `call` until it succeeds, fails with a non-transient error, or
    /// runs out of attempts. An attempt that outlives the timeout counts as
    /// a [`RemoteFailureKind::Timeout`](crate::error::RemoteFailureKind::Timeout).
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::timeout(format!(
                    "{label} did not answer within {} ms",
                    self.timeout_ms
                ))),
            };

            match outcome {
                Ok(value) => {
                    debug!("{label} succeeded on attempt {attempt}/{attempts}");
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{label} attempt {attempt}/{attempts} failed ({err}); retrying in {} ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!("{label} failed after {attempt} attempt(s): {err}");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteFailureKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff_ms: 1,
            timeout_ms: 50,
        }
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 1000,
            timeout_ms: 1,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .run("identify", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RemoteError::server("503"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_response_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy(3)
            .run("generate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RemoteError::malformed("no image")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, RemoteFailureKind::MalformedResponse);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let result: Result<(), _> = fast_policy(2)
            .run("identify", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().kind, RemoteFailureKind::Timeout);
    }
}
