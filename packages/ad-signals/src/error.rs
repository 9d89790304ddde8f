//! Typed errors for the ad-signals library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. None of these escape
//! [`AssessmentEngine::assess`](crate::AssessmentEngine::assess): fetch and
//! parse failures are recovered inside detectors, detector failures are
//! recovered by the engine.

use thiserror::Error;

use crate::types::signal::SourceId;

/// Errors from a single outbound fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request did not complete within its timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// DNS, TLS, connect or body-read failure
    #[error("connection error fetching {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Server answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// URL could not be parsed
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The caller's cancellation token fired
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Connection { .. } => true,
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl { .. } | FetchError::Cancelled => false,
        }
    }
}

/// Markup that could not be turned into inspectable text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Body was empty or whitespace only
    #[error("empty document")]
    Empty,

    /// Response declared a non-markup content type
    #[error("not an HTML document: {content_type}")]
    NotHtml { content_type: String },
}

/// Errors a detector may surface to the aggregation engine.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// The detector could not produce a result
    #[error("{source_id} detector failed: {message}")]
    Failed { source_id: SourceId, message: String },

    /// Evaluation abandoned because the caller cancelled
    #[error("detector cancelled")]
    Cancelled,
}

/// Engine construction errors and degraded-assessment reasons.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two detectors registered for the same weight slot
    #[error("duplicate detector for source: {0}")]
    DuplicateSource(SourceId),

    /// Engine built without any detector
    #[error("no detectors registered")]
    NoDetectors,

    /// Scoring policy is inconsistent
    #[error("invalid scoring policy: {reason}")]
    InvalidPolicy { reason: String },

    /// Input normalized to an empty domain
    #[error("empty domain after normalization: {input:?}")]
    EmptyDomain { input: String },

    /// Whole domain evaluation aborted
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for detector evaluations.
pub type DetectorResult<T> = std::result::Result<T, DetectorError>;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let url = "https://example.com".to_string();
        assert!(FetchError::Timeout { url: url.clone() }.is_transient());
        assert!(FetchError::Http { url: url.clone(), status: 503 }.is_transient());
        assert!(FetchError::Http { url: url.clone(), status: 429 }.is_transient());
        assert!(!FetchError::Http { url: url.clone(), status: 404 }.is_transient());
        assert!(!FetchError::InvalidUrl { url }.is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = FetchError::Http {
            url: "https://example.com".to_string(),
            status: 403,
        };
        assert_eq!(err.to_string(), "HTTP 403 from https://example.com");

        let err = DetectorError::Failed {
            source_id: SourceId::Tracking,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "tracking detector failed: boom");
    }
}
