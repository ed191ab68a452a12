use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use super::errors::Result;
use super::types::{PageRequest, SourceClient, SourcePage};

/// Request budgets.
pub mod rate_limits {
    /// Requests per second for a source without a configured limit.
    pub const DEFAULT_RPS: u32 = 5;
}

/// Per-source request budget.
///
/// Cloning shares the budget, so every session opened for the same source
/// draws from one quota no matter how many connections sync in parallel.
#[derive(Clone)]
pub struct ApiRateLimiter {
    quota: Arc<DefaultDirectRateLimiter>,
    per_second: NonZeroU32,
}

impl ApiRateLimiter {
    /// A budget of `per_second` requests. Zero is raised to one.
    pub fn new(per_second: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            quota: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            per_second,
        }
    }

    /// Block until one request fits the budget.
    pub async fn wait(&self) {
        self.quota.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("per_second", &self.per_second)
            .finish()
    }
}

/// [`SourceClient`] decorator that spends from an [`ApiRateLimiter`]
/// before every page fetch.
#[derive(Clone)]
pub struct RateLimitedClient<C> {
    client: C,
    limiter: ApiRateLimiter,
}

impl<C> RateLimitedClient<C> {
    pub fn new(client: C, per_second: u32) -> Self {
        Self::with_limiter(client, ApiRateLimiter::new(per_second))
    }

    pub fn with_limiter(client: C, limiter: ApiRateLimiter) -> Self {
        Self { client, limiter }
    }

    pub fn inner(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: SourceClient> SourceClient for RateLimitedClient<C> {
    fn source_id(&self) -> &str {
        self.client.source_id()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<SourcePage> {
        self.limiter.wait().await;
        self.client.fetch_page(request).await
    }
}
