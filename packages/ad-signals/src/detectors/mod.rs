//! The three signal detectors and the page-probe result they share.
//!
//! | Detector | Source slot | Looks at |
//! |---|---|---|
//! | [`TrackingAnalyzer`] | `tracking` | the domain's own homepage markup |
//! | [`PublicLibraryLookup`] | `public_library` | public ad-library search pages |
//! | [`PageTransparencyChecker`] | `page_transparency` | social pages and their ad disclosures |

pub mod library;
pub mod tracking;
pub mod transparency;

pub use library::{LibraryHit, LibrarySurface, PublicLibraryLookup};
pub use tracking::TrackingAnalyzer;
pub use transparency::{PageCheck, PageTransparencyChecker};

use tracing::debug;

use crate::error::{DetectorError, FetchError};
use crate::traits::fetcher::{fetch_checked, FetchRequest, FetchResponse, Fetcher};

/// Outcome of looking for something on a remote page.
///
/// "Nothing there" is a normal outcome, not an error, so it gets its own
/// variant instead of being folded into failures.
#[derive(Debug, Clone, PartialEq)]
pub enum PageProbe<T> {
    /// The thing was found
    Found(T),
    /// The page was reachable but did not contain it (or did not exist)
    NotFound,
    /// The page could not be fetched
    Error(String),
}

impl<T> PageProbe<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, PageProbe::Found(_))
    }

    /// Convert the found value, keeping the other variants.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PageProbe<U> {
        match self {
            PageProbe::Found(value) => PageProbe::Found(f(value)),
            PageProbe::NotFound => PageProbe::NotFound,
            PageProbe::Error(message) => PageProbe::Error(message),
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            PageProbe::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Fetch one page for a detector.
///
/// Cancellation is the only `Err`; 404/410 map to `NotFound` and every other
/// failure to `Error`.
pub(crate) async fn probe_page(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
) -> Result<PageProbe<FetchResponse>, DetectorError> {
    match fetch_checked(fetcher, request).await {
        Ok(response) => Ok(PageProbe::Found(response)),
        Err(FetchError::Cancelled) => Err(DetectorError::Cancelled),
        Err(FetchError::Http { status: 404 | 410, .. }) => {
            debug!(url = %request.url, "page not found");
            Ok(PageProbe::NotFound)
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, transient = e.is_transient(), "page fetch failed");
            Ok(PageProbe::Error(e.to_string()))
        }
    }
}
