//! Fetcher trait for outbound HTTP.
//!
//! The engine never talks to the network directly. Detectors build a
//! [`FetchRequest`] (URL, header set, timeout, cancellation token) and hand
//! it to a [`Fetcher`]. Every failure comes back as a [`FetchError`] value;
//! fetchers do not retry, callers decide.
//!
//! ```rust,ignore
//! let request = FetchRequest::new("https://example.com", Duration::from_secs(15))
//!     .with_profile(BrowserProfile::for_url("https://example.com", 0))
//!     .with_cancel(cancel.child_token());
//!
//! match fetcher.fetch(&request).await {
//!     Ok(response) => inspect(&response.body),
//!     Err(e) => tracing::warn!(error = %e, "fetch failed"),
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::fetchers::headers::BrowserProfile;

/// One outbound request. Header sets are carried per request so that no
/// process-wide user-agent state is needed.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,

    /// Header name/value pairs sent with the request
    pub headers: Vec<(String, String)>,

    pub timeout: Duration,

    /// Fires when the caller abandons the request
    pub cancel: CancellationToken,
}

impl FetchRequest {
    /// Create a request with no headers and a fresh token.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Apply a browser header profile.
    pub fn with_profile(mut self, profile: &BrowserProfile) -> Self {
        self.headers.extend(profile.headers());
        self
    }

    /// Add or replace a single header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,

    pub status: u16,

    pub body: String,

    pub content_type: Option<String>,
}

impl FetchResponse {
    /// Create a 200 response.
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
            content_type: Some("text/html; charset=utf-8".to_string()),
        }
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Outbound HTTP capability.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform a single fetch. Non-2xx statuses are returned as
    /// [`FetchError::Http`].
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse>;

    /// Name for logs.
    fn name(&self) -> &str {
        "fetcher"
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        (**self).fetch(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Fetch, then treat an already-cancelled token as cancellation even when the
/// fetcher ignored it.
pub async fn fetch_checked(fetcher: &dyn Fetcher, request: &FetchRequest) -> FetchResult<FetchResponse> {
    if request.cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    fetcher.fetch(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_header_replaces_case_insensitive() {
        let request = FetchRequest::new("https://example.com", Duration::from_secs(5))
            .with_header("User-Agent", "a")
            .with_header("user-agent", "b");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("USER-AGENT"), Some("b"));
    }

    #[test]
    fn test_profile_headers_applied() {
        let profile = BrowserProfile::for_url("https://example.com", 0);
        let request =
            FetchRequest::new("https://example.com", Duration::from_secs(5)).with_profile(profile);
        assert!(request.header("user-agent").is_some());
        assert!(request.header("accept").is_some());
    }
}
