use crate::error::{ConfigError, ModelError};
use crate::models::non_zero_duration;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timeout and retry budget applied to every call into an external model service.
#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallPolicy {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    /// Extra attempts after the first one, only for transient failures.
    pub max_retries: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero_duration("call timeout", self.timeout)
    }

    /// Runs `call` under the timeout, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, backend: &str, mut call: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ModelError::Timeout {
                    backend: backend.to_string(),
                    after: self.timeout,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(backend, attempt, error = %error, "transient failure, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable() -> ModelError {
        ModelError::BackendResponse {
            backend: "test".to_string(),
            status: 503,
            details: "busy".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = CallPolicy::default();

        let result = policy
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(unavailable())
                    } else {
                        Ok("answer")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = CallPolicy::default();

        let result: Result<(), _> = policy
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(unavailable())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = CallPolicy::default();

        let result: Result<(), _> = policy
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ModelError::BackendResponse {
                        backend: "test".to_string(),
                        status: 404,
                        details: "model not found".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let policy = CallPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        };

        let result = policy
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ModelError::Timeout { .. })));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let policy = CallPolicy {
            timeout: Duration::ZERO,
            ..CallPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
