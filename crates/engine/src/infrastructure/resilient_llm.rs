//! Retrying wrapper around any `LlmPort`.
//!
//! Transient failures (connection errors, throttling, server errors) are
//! retried on the configured backoff; everything else is returned at once.

use async_trait::async_trait;
use std::sync::Arc;

use crate::infrastructure::config::RetryPolicy;
use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse};

pub struct ResilientLlmClient {
    inner: Arc<dyn LlmPort>,
    policy: RetryPolicy,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmPort for ResilientLlmClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(attempt = attempt + 1, "LLM request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(attempts = attempt + 1, error = %e, "LLM request failed");
                    return Err(e);
                }
            }
        }
    }
}
