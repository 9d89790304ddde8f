//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the scoring library
//! without making real network calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{DetectorError, DetectorResult, FetchError, FetchResult};
use crate::traits::{
    clock::Clock,
    detector::Detector,
    fetcher::{FetchRequest, FetchResponse, Fetcher},
};
use crate::types::{
    domain::DomainKey,
    signal::{SignalResult, SourceId},
};

/// Canned reply for a URL.
#[derive(Debug, Clone)]
pub enum MockReply {
    Page(FetchResponse),
    Status(u16),
    Timeout,
    ConnectionRefused,
    /// Never answers: waits out the request timeout, then times out.
    Hang,
}

impl MockReply {
    fn resolve(&self, url: &str) -> FetchResult<FetchResponse> {
        match self {
            MockReply::Page(response) => Ok(FetchResponse {
                url: url.to_string(),
                ..response.clone()
            }),
            MockReply::Status(status) => Err(FetchError::Http {
                url: url.to_string(),
                status: *status,
            }),
            MockReply::Timeout | MockReply::Hang => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
            MockReply::ConnectionRefused => Err(FetchError::Connection {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Mock connection refused",
                )),
            }),
        }
    }
}

/// A mock fetcher for testing.
///
/// Returns predefined replies without making network requests. Unknown
/// URLs answer 404 unless a fallback is set. Clones share replies and call
/// history.
#[derive(Clone, Default)]
pub struct MockFetcher {
    /// Predefined replies by URL
    replies: Arc<RwLock<HashMap<String, MockReply>>>,

    /// Reply for URLs without a predefined one
    fallback: Option<MockReply>,

    /// Artificial latency per request
    delay: Option<Duration>,

    /// Call tracking
    calls: Arc<RwLock<Vec<FetchRequest>>>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve an HTML page at a URL.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_reply(url, MockReply::Page(FetchResponse::ok("", body)))
    }

    /// Answer a URL with a non-2xx status.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.with_reply(url, MockReply::Status(status))
    }

    /// Make a URL time out.
    pub fn with_timeout(self, url: impl Into<String>) -> Self {
        self.with_reply(url, MockReply::Timeout)
    }

    /// Make a URL hang until the request times out.
    pub fn with_hang(self, url: impl Into<String>) -> Self {
        self.with_reply(url, MockReply::Hang)
    }

    /// Make a URL refuse connections.
    pub fn with_connection_error(self, url: impl Into<String>) -> Self {
        self.with_reply(url, MockReply::ConnectionRefused)
    }

    /// Set a reply for a URL.
    pub fn with_reply(self, url: impl Into<String>, reply: MockReply) -> Self {
        self.replies.write().unwrap().insert(url.into(), reply);
        self
    }

    /// Serve this page for every unknown URL.
    pub fn with_fallback_page(mut self, body: impl Into<String>) -> Self {
        self.fallback = Some(MockReply::Page(FetchResponse::ok("", body)));
        self
    }

    /// Answer every unknown URL with this status.
    pub fn with_fallback_status(mut self, status: u16) -> Self {
        self.fallback = Some(MockReply::Status(status));
        self
    }

    /// Delay every request. Cancellation interrupts the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    /// Full requests, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        self.calls.write().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = request.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let reply = self.replies.read().unwrap().get(&request.url).cloned();
        if matches!(reply, Some(MockReply::Hang)) {
            tokio::select! {
                _ = request.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(request.timeout) => {}
            }
        }
        match reply.or_else(|| self.fallback.clone()) {
            Some(reply) => reply.resolve(&request.url),
            None => Err(FetchError::Http {
                url: request.url.clone(),
                status: 404,
            }),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A detector that returns a fixed result.
#[derive(Debug, Clone)]
pub struct StaticDetector {
    result: SignalResult,
    delay: Option<Duration>,
}

impl StaticDetector {
    /// Detector for `result.source_id` that always returns `result`.
    pub fn new(result: SignalResult) -> Self {
        Self {
            result,
            delay: None,
        }
    }

    /// Shorthand for a scored result.
    pub fn scored(source: SourceId, score: f64, has_signal: bool) -> Self {
        Self::new(
            SignalResult::empty(source)
                .with_score(score)
                .with_signal(has_signal),
        )
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Detector for StaticDetector {
    fn source(&self) -> SourceId {
        self.result.source_id
    }

    async fn evaluate(
        &self,
        _domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(DetectorError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(self.result.clone())
    }
}

/// A detector that always returns an error.
#[derive(Debug, Clone)]
pub struct FailingDetector {
    source: SourceId,
    message: String,
}

impl FailingDetector {
    pub fn new(source: SourceId, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Detector for FailingDetector {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn evaluate(
        &self,
        _domain: &DomainKey,
        _cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        Err(DetectorError::Failed {
            source_id: self.source,
            message: self.message.clone(),
        })
    }
}

/// A detector that panics while evaluating.
#[derive(Debug, Clone)]
pub struct PanickingDetector {
    source: SourceId,
}

impl PanickingDetector {
    pub fn new(source: SourceId) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Detector for PanickingDetector {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn evaluate(
        &self,
        domain: &DomainKey,
        _cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        panic!("mock detector panic for {}", domain);
    }
}

/// A detector that records how many evaluations overlap.
///
/// Each evaluation counts as one in-flight wave of fetches for its domain.
/// Clones share counters.
#[derive(Debug, Clone)]
pub struct ConcurrencyProbe {
    source: SourceId,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new(source: SourceId, delay: Duration) -> Self {
        Self {
            source,
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Highest number of simultaneous evaluations seen.
    pub fn max_observed(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Evaluations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Evaluations started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Detector for ConcurrencyProbe {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn evaluate(
        &self,
        _domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(self.in_flight.clone());
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::select! {
            _ = cancel.cancelled() => Err(DetectorError::Cancelled),
            _ = tokio::time::sleep(self.delay) => Ok(SignalResult::empty(self.source)),
        }
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> FetchRequest {
        FetchRequest::new(url, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_mock_fetcher_pages() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com/page1", "Content 1")
            .with_page("https://example.com/page2", "Content 2");

        let page = fetcher.fetch(&request("https://example.com/page1")).await.unwrap();
        assert_eq!(page.body, "Content 1");
        assert_eq!(page.url, "https://example.com/page1");

        // Non-existent page is a 404
        let result = fetcher.fetch(&request("https://example.com/missing")).await;
        assert!(matches!(result, Err(FetchError::Http { status: 404, .. })));

        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_fetcher_failures() {
        let fetcher = MockFetcher::new()
            .with_timeout("https://slow.com")
            .with_connection_error("https://down.com");

        let timeout = fetcher.fetch(&request("https://slow.com")).await;
        assert!(matches!(timeout, Err(FetchError::Timeout { .. })));

        let refused = fetcher.fetch(&request("https://down.com")).await;
        assert!(matches!(refused, Err(FetchError::Connection { .. })));
        assert!(refused.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_mock_fetcher_delay_cancellable() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com", "x")
            .with_delay(Duration::from_secs(60));
        let req = request("https://example.com");
        req.cancel.cancel();
        let result = fetcher.fetch(&req).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[test]
    fn test_static_and_failing_detectors() {
        let domain = DomainKey::parse("example.com").unwrap();
        let cancel = CancellationToken::new();

        let detector = StaticDetector::scored(SourceId::PublicLibrary, 40.0, true);
        let signal = tokio_test::assert_ok!(tokio_test::block_on(detector.evaluate(&domain, &cancel)));
        assert_eq!(signal.source_id, SourceId::PublicLibrary);
        assert_eq!(signal.raw_score, 40.0);

        let failing = FailingDetector::new(SourceId::Tracking, "boom");
        let err = tokio_test::assert_err!(tokio_test::block_on(failing.evaluate(&domain, &cancel)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_concurrency_probe_counts() {
        let probe = ConcurrencyProbe::new(SourceId::Tracking, Duration::from_millis(20));
        let domain = DomainKey::parse("example.com").unwrap();
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            probe.evaluate(&domain, &cancel),
            probe.evaluate(&domain, &cancel)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(probe.calls(), 2);
        assert_eq!(probe.max_observed(), 2);
        assert_eq!(probe.in_flight(), 0);
    }
}
