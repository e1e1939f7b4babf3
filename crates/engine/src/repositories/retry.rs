//! Bounded retry for ledger writes.

use std::future::Future;

use crate::infrastructure::config::RetryPolicy;
use crate::infrastructure::ports::RepoError;

use super::ledger::LedgerError;

/// Retries transient store failures with exponential backoff. Anything else,
/// or running out of attempts, is a [`LedgerError::Storage`].
#[derive(Debug, Clone)]
pub struct StorageRetry {
    config: RetryPolicy,
}

impl StorageRetry {
    pub fn new(config: &RetryPolicy) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation,
                            attempt = attempt + 1,
                            "Storage operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.delay(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Storage operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Storage operation failed"
                    );
                    return Err(LedgerError::Storage {
                        operation,
                        attempts: attempt + 1,
                        source: e,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry(max_retries: u32) -> StorageRetry {
        StorageRetry::new(&RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
        })
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = retry(3)
            .run("append", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RepoError::database("append", "locked"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.expect("eventually ok"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(2)
            .run("append", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RepoError::database("append", "disk full")) }
            })
            .await;
        match result {
            Err(LedgerError::Storage { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected storage error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn constraint_violations_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(5)
            .run("append", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RepoError::constraint("duplicate sequence")) }
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Storage { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
