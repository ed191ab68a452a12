//! Backoff for transient source failures.
//!
//! A page fetch that hits a network error or a 5xx response is retried a few
//! times before the failure reaches the sync loop. Throttling and rejected
//! credentials are returned immediately: the loop records them and the next
//! sync picks up from the saved position.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::source::{Result, SourceError};

/// How often and how patiently a single request is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: usize,
    pub first_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            first_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(retries: usize, first_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retries,
            first_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Deterministic delays, for tests.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.first_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.retries);
        if self.jitter { builder.with_jitter() } else { builder }
    }
}

/// Run `fetch`, retrying while it fails with a transient [`SourceError`].
///
/// `context` identifies the request in logs, e.g. `"mastodon posts"`.
pub async fn retry_transient<T, F, Fut>(fetch: F, policy: &RetryPolicy, context: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retried = 0u32;

    fetch
        .retry(policy.backoff())
        .when(SourceError::is_transient)
        .notify(|err: &SourceError, delay: Duration| {
            retried += 1;
            tracing::debug!(
                context,
                retry = retried,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient source failure, retrying"
            );
        })
        .await
}
