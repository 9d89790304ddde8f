//! Rate-limited fetcher wrapper.
//!
//! Wraps any Fetcher implementation with a shared request budget using the
//! governor crate. The third-party surfaces the detectors query throttle
//! aggressively, so hosts running large batches usually want this.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{FetchRequest, FetchResponse, Fetcher};
use crate::types::config::FetchConfig;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// A fetcher wrapper that enforces a request rate.
///
/// Zero rates are raised to one request per second.
pub struct RateLimitedFetcher<F: Fetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: Fetcher> RateLimitedFetcher<F> {
    /// Create a rate-limited fetcher.
    pub fn new(fetcher: F, requests_per_second: u32) -> Self {
        Self::with_quota(fetcher, Quota::per_second(non_zero(requests_per_second)))
    }

    /// Create with a custom quota.
    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create with burst support.
    pub fn with_burst(fetcher: F, requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(non_zero(requests_per_second)).allow_burst(non_zero(burst));
        Self::with_quota(fetcher, quota)
    }

    /// Access the wrapped fetcher.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Wait for a permit, giving up if the request is cancelled first.
    async fn wait_for_permit(&self, cancel: &CancellationToken) -> FetchResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        self.wait_for_permit(&request.cancel).await?;
        self.inner.fetch(request).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Extension trait for easy rate limiting.
pub trait FetcherExt: Fetcher + Sized {
    /// Wrap this fetcher with rate limiting.
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, requests_per_second)
    }

    /// Wrap with rate limiting and burst support.
    fn rate_limited_with_burst(self, requests_per_second: u32, burst: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::with_burst(self, requests_per_second, burst)
    }
}

impl<F: Fetcher + Sized> FetcherExt for F {}

/// Wrap a fetcher according to fetch settings. A zero rate leaves it
/// unlimited.
pub fn apply_rate_limit(fetcher: Arc<dyn Fetcher>, config: &FetchConfig) -> Arc<dyn Fetcher> {
    if config.requests_per_second == 0 {
        return fetcher;
    }
    Arc::new(fetcher.rate_limited_with_burst(config.requests_per_second, config.burst))
}
