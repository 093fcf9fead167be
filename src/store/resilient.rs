//! Timeout and retry wrapper around any [`ObjectStore`].

use super::{ListPage, ObjectStore};
use crate::error::AuditError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Per-call timeout and bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: usize,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_backoff: Duration::from_millis(250),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T, AuditError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AuditError>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AuditError::transient(
                    target,
                    format!("timed out after {}s", self.call_timeout.as_secs_f64()),
                )),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        "Store call for {} failed ({}); retry {}/{} in {:?}",
                        target, e, attempt, self.retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// Applies a [`RetryPolicy`] to every call of the wrapped store.
pub struct ResilientStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ObjectStore> ResilientStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for ResilientStore<S> {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, AuditError> {
        self.policy
            .run(prefix, || self.inner.list_page(prefix, continuation))
            .await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, AuditError> {
        self.policy.run(key, || self.inner.get_object(key)).await
    }
}
