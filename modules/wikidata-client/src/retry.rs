//! Bounded retry around a single outbound call.
//!
//! Rate-limit responses are retried after the provider's `Retry-After` wait
//! (or the policy default). Block responses and every other failure surface
//! on first occurrence.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{ErrorClass, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Wait used when the provider gives no hint.
    pub default_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, default_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_wait,
        }
    }
}

/// Observable executor milestones, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    RateLimited {
        operation: String,
        attempt: u32,
        wait: Duration,
    },
    SucceededAfterRetry {
        operation: String,
        attempts: u32,
    },
    Exhausted {
        operation: String,
        attempts: u32,
    },
    Blocked {
        operation: String,
    },
}

pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Option<RetryObserver>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl Fn(&RetryEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn emit(&self, event: RetryEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Run `call` until it succeeds, hits a non-retryable error, or the
    /// attempt budget is spent. Exhaustion returns the last error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempts = attempt, "Request succeeded after retry");
                        self.emit(RetryEvent::SucceededAfterRetry {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.class() {
                ErrorClass::Retryable { retry_after } if attempt < self.policy.max_attempts => {
                    let wait = retry_after.unwrap_or(self.policy.default_wait);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited, waiting before retry"
                    );
                    self.emit(RetryEvent::RateLimited {
                        operation: operation.to_string(),
                        attempt,
                        wait,
                    });
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                ErrorClass::Retryable { .. } => {
                    warn!(operation, attempts = attempt, error = %err, "Retry budget exhausted");
                    self.emit(RetryEvent::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                    });
                    return Err(err);
                }
                ErrorClass::Fatal => {
                    warn!(operation, error = %err, "Request blocked, not retrying");
                    self.emit(RetryEvent::Blocked {
                        operation: operation.to_string(),
                    });
                    return Err(err);
                }
                ErrorClass::Propagate => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;
    use crate::error::WikidataError;

    fn rate_limited(retry_after: Option<u64>) -> WikidataError {
        WikidataError::RateLimited {
            url: "https://query.example/sparql".into(),
            retry_after: retry_after.map(Duration::from_secs),
        }
    }

    fn recording_executor(policy: RetryPolicy) -> (RetryExecutor, Arc<Mutex<Vec<RetryEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let executor =
            RetryExecutor::new(policy).with_observer(move |e| sink.lock().unwrap().push(e.clone()));
        (executor, events)
    }

    #[tokio::test(start_paused = true)]
    async fn honors_provider_wait_then_succeeds() {
        let (executor, events) =
            recording_executor(RetryPolicy::new(4, Duration::from_secs(60)));
        let mut calls = 0;
        let started = Instant::now();

        let result = executor
            .run("query", || {
                calls += 1;
                let n = calls;
                async move {
                    if n == 1 {
                        Err(rate_limited(Some(7)))
                    } else {
                        Ok("rows")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "rows");
        assert_eq!(calls, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                RetryEvent::RateLimited {
                    operation: "query".into(),
                    attempt: 1,
                    wait: Duration::from_secs(7),
                },
                RetryEvent::SucceededAfterRetry {
                    operation: "query".into(),
                    attempts: 2,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_default_wait() {
        let executor = RetryExecutor::new(RetryPolicy::new(3, Duration::from_millis(10_500)));
        let mut calls = 0;
        let started = Instant::now();

        let result = executor
            .run("pageviews", || {
                calls += 1;
                let n = calls;
                async move {
                    if n == 1 {
                        Err(rate_limited(None))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(10_500));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_fails_without_retry() {
        let (executor, events) = recording_executor(RetryPolicy::new(4, Duration::from_secs(60)));
        let mut calls = 0;
        let started = Instant::now();

        let result: Result<()> = executor
            .run("query", || {
                calls += 1;
                async {
                    Err(WikidataError::Blocked {
                        url: "https://query.example/sparql".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(WikidataError::Blocked { .. })));
        assert_eq!(calls, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(
            *events.lock().unwrap(),
            vec![RetryEvent::Blocked { operation: "query".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_returns_last_error() {
        let (executor, events) = recording_executor(RetryPolicy::new(3, Duration::from_secs(2)));
        let mut calls = 0;
        let started = Instant::now();

        let result: Result<()> = executor
            .run("query", || {
                calls += 1;
                async { Err(rate_limited(None)) }
            })
            .await;

        assert!(matches!(result, Err(WikidataError::RateLimited { .. })));
        assert_eq!(calls, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&RetryEvent::Exhausted {
                operation: "query".into(),
                attempts: 3,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_propagate_immediately() {
        let executor = RetryExecutor::new(RetryPolicy::new(4, Duration::from_secs(60)));
        let mut calls = 0;

        let result: Result<()> = executor
            .run("query", || {
                calls += 1;
                async { Err(WikidataError::Network("connection reset".into())) }
            })
            .await;

        assert!(matches!(result, Err(WikidataError::Network(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn first_try_success_emits_nothing() {
        let (executor, events) = recording_executor(RetryPolicy::new(4, Duration::from_secs(60)));
        let value = executor.run("query", || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn policy_allows_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
