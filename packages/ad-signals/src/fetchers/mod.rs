//! Fetcher implementations and request header profiles.

pub mod headers;
pub mod http;
pub mod rate_limited;

pub use headers::BrowserProfile;
pub use http::HttpFetcher;
pub use rate_limited::{apply_rate_limit, FetcherExt, RateLimitedFetcher};
