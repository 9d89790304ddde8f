//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{FetchRequest, FetchResponse, Fetcher};
use crate::types::config::FetchConfig;

/// Fetcher that performs real HTTP GETs.
///
/// One `reqwest::Client` (and so one connection pool) lives inside each
/// `HttpFetcher`. Create it once per run and share it through an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use ad_signals::{FetchConfig, HttpFetcher};
///
/// let fetcher = HttpFetcher::new(&FetchConfig::default())?;
/// let response = fetcher.fetch(&FetchRequest::new("https://example.com", timeout)).await?;
/// ```
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher from fetch settings.
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;
        Ok(Self { client })
    }

    /// Use a custom HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: Url, request: &FetchRequest) -> FetchResult<FetchResponse> {
        let mut builder = self.client.get(url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        Ok(FetchResponse {
            url: final_url,
            status: status.as_u16(),
            body,
            content_type,
        })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Connection {
            url: url.to_string(),
            source: Box::new(error),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        let url = Url::parse(&request.url).map_err(|_| FetchError::InvalidUrl {
            url: request.url.clone(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: request.url.clone(),
            });
        }

        debug!(url = %request.url, timeout_ms = request.timeout.as_millis() as u64, "HTTP fetch starting");

        let result = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.send(url, request) => result,
        };

        match &result {
            Ok(response) => debug!(
                url = %request.url,
                status = response.status,
                bytes = response.body.len(),
                "HTTP fetch completed"
            ),
            Err(FetchError::Cancelled) => debug!(url = %request.url, "HTTP fetch cancelled"),
            Err(e) => warn!(url = %request.url, error = %e, "HTTP fetch failed"),
        }

        result
    }

    fn name(&self) -> &str {
        "http"
    }
}
