//! Public ad-library lookup.
//!
//! Queries public ad-transparency search pages for the domain and its
//! lexical variants. A result page is accepted only when it mentions the
//! domain token *and* at least one ad-indicator keyword; a page that merely
//! mentions the domain is not evidence of ads.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{probe_page, PageProbe};
use crate::error::DetectorResult;
use crate::fetchers::headers::BrowserProfile;
use crate::matcher::html::ParsedPage;
use crate::traits::detector::Detector;
use crate::traits::fetcher::{FetchRequest, FetchResponse, Fetcher};
use crate::types::domain::DomainKey;
use crate::types::signal::{SignalResult, SourceId};

lazy_static! {
    static ref AD_COUNT_REGEX: Regex =
        Regex::new(r"(?i)\b(\d[\d,.]*)\s*(?:ads?|advertisements?|results?)\b").unwrap();
}

/// One searchable public ad library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySurface {
    /// Display name used in evidence
    pub name: String,

    /// Search URL with a `{query}` placeholder
    pub url_template: String,

    /// Lower-case keywords whose presence indicates ad activity
    pub indicators: Vec<String>,
}

impl LibrarySurface {
    pub fn new(
        name: impl Into<String>,
        url_template: impl Into<String>,
        indicators: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            indicators: indicators
                .into_iter()
                .map(|i| i.into().to_lowercase())
                .collect(),
        }
    }

    /// Meta's public Ad Library keyword search.
    pub fn meta_ad_library() -> Self {
        Self::new(
            "Meta Ad Library",
            "https://www.facebook.com/ads/library/?active_status=all&ad_type=all&country=ALL&q={query}&search_type=keyword_unordered",
            [
                "ads from",
                "advertisement",
                "sponsored",
                "see all ads",
                "active ads",
                "inactive ads",
                "advertiser",
                "page transparency",
            ],
        )
    }

    /// Google Ads Transparency Center advertiser search.
    pub fn google_transparency() -> Self {
        Self::new(
            "Google Ads Transparency Center",
            "https://adstransparency.google.com/advertiser?advertiser={query}",
            [
                "verified advertiser",
                "advertiser",
                "campaign",
                "google ads",
                "advertisement",
            ],
        )
    }

    /// Default surfaces, most informative first.
    pub fn defaults() -> Vec<Self> {
        vec![Self::meta_ad_library(), Self::google_transparency()]
    }

    /// Search URL for a query term.
    pub fn search_url(&self, query: &str) -> String {
        self.url_template
            .replace("{query}", &urlencoding::encode(query))
    }
}

/// An accepted library result page.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryHit {
    pub surface: String,
    pub query: String,
    pub url: String,

    /// Indicator keywords found, in surface order
    pub indicators: Vec<String>,

    /// A link on the page names the domain
    pub advertiser_found: bool,

    /// Text of the links that named the domain
    pub advertiser_names: Vec<String>,

    /// Largest "<n> ads" style count on the page
    pub estimated_ads: u64,
}

impl LibraryHit {
    /// 40 for a confirmed advertiser, 30 for a visible ad count, 10 per
    /// indicator up to 30.
    pub fn confidence(&self) -> u32 {
        let mut confidence = 0u32;
        if self.advertiser_found {
            confidence += 40;
        }
        if self.estimated_ads > 0 {
            confidence += 30;
        }
        let indicators = u32::try_from(self.indicators.len()).unwrap_or(u32::MAX);
        confidence = confidence.saturating_add(indicators.saturating_mul(10).min(30));
        confidence.min(100)
    }

    /// 60 with a confirmed advertiser, otherwise 40, plus 0.4 × confidence.
    pub fn score(&self) -> f64 {
        let base = if self.advertiser_found { 60.0 } else { 40.0 };
        (base + 0.4 * f64::from(self.confidence())).min(100.0)
    }

    fn evidence(&self) -> Vec<String> {
        let mut evidence = vec![
            format!("surface: {}", self.surface),
            format!("query: {}", self.query),
        ];
        evidence.extend(self.indicators.iter().map(|i| format!("indicator: {}", i)));
        evidence.extend(
            self.advertiser_names
                .iter()
                .map(|name| format!("advertiser link: {}", name)),
        );
        if self.estimated_ads > 0 {
            evidence.push(format!("estimated ads: {}", self.estimated_ads));
        }
        evidence
    }
}

/// Looks the domain up in public ad libraries.
pub struct PublicLibraryLookup {
    fetcher: Arc<dyn Fetcher>,
    surfaces: Vec<LibrarySurface>,
    request_timeout: Duration,
}

impl PublicLibraryLookup {
    /// Create a lookup over the default surfaces.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            surfaces: LibrarySurface::defaults(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Replace the surfaces queried.
    pub fn with_surfaces(mut self, surfaces: Vec<LibrarySurface>) -> Self {
        self.surfaces = surfaces;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Inspect one search result page. Pure; no I/O.
    pub fn inspect(
        &self,
        surface: &LibrarySurface,
        query: &str,
        domain: &DomainKey,
        response: &FetchResponse,
    ) -> PageProbe<LibraryHit> {
        let base = Url::parse(&response.url).ok();
        let page = match ParsedPage::parse(&response.body, response.content_type.as_deref(), base.as_ref()) {
            Ok(page) => page,
            Err(e) => {
                debug!(surface = %surface.name, error = %e, "library page not parseable");
                return PageProbe::NotFound;
            }
        };

        let text = page.text_lower();
        let token = domain.domain_token();

        let mut advertiser_names: Vec<String> = Vec::new();
        for link in &page.links {
            let named = link.href.to_lowercase().contains(token)
                || link.text.to_lowercase().contains(token);
            if named && link.text.chars().count() > 1 && !advertiser_names.contains(&link.text) {
                advertiser_names.push(link.text.clone());
            }
        }

        let token_present = text.contains(token) || !advertiser_names.is_empty();
        let indicators: Vec<String> = surface
            .indicators
            .iter()
            .filter(|indicator| text.contains(indicator.as_str()))
            .cloned()
            .collect();

        if !token_present || indicators.is_empty() {
            return PageProbe::NotFound;
        }

        PageProbe::Found(LibraryHit {
            surface: surface.name.clone(),
            query: query.to_string(),
            url: response.url.clone(),
            indicators,
            advertiser_found: !advertiser_names.is_empty(),
            advertiser_names,
            estimated_ads: estimate_ad_count(&text),
        })
    }
}

/// Largest number followed by "ad(s)", "advertisement(s)" or "result(s)".
fn estimate_ad_count(text: &str) -> u64 {
    AD_COUNT_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let digits: String = caps[1].chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .max()
        .unwrap_or(0)
}

#[async_trait]
impl Detector for PublicLibraryLookup {
    fn source(&self) -> SourceId {
        SourceId::PublicLibrary
    }

    async fn evaluate(
        &self,
        domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        let variants = domain.search_variants();
        let mut reached = 0usize;
        let mut last_error: Option<String> = None;

        for (attempt, variant) in variants.iter().enumerate() {
            for surface in &self.surfaces {
                let url = surface.search_url(variant);
                let request = FetchRequest::new(&url, self.request_timeout)
                    .with_profile(BrowserProfile::for_url(&url, attempt))
                    .with_cancel(cancel.child_token());

                let response = match probe_page(self.fetcher.as_ref(), &request).await? {
                    PageProbe::Found(response) => response,
                    PageProbe::NotFound => {
                        reached += 1;
                        continue;
                    }
                    PageProbe::Error(message) => {
                        debug!(surface = %surface.name, query = %variant, error = %message, "library search failed");
                        last_error = Some(message);
                        continue;
                    }
                };
                reached += 1;

                if let PageProbe::Found(hit) = self.inspect(surface, variant, domain, &response) {
                    info!(
                        domain = %domain,
                        surface = %hit.surface,
                        query = %variant,
                        estimated_ads = hit.estimated_ads,
                        "library advertiser match"
                    );
                    return Ok(SignalResult::empty(SourceId::PublicLibrary)
                        .with_score(hit.score())
                        .with_confidence(hit.confidence())
                        .with_signal(true)
                        .with_evidence(hit.evidence()));
                }
            }
        }

        if reached == 0 {
            if let Some(message) = last_error {
                return Ok(SignalResult::failed(
                    SourceId::PublicLibrary,
                    format!("no library surface reachable: {}", message),
                ));
            }
        }

        Ok(SignalResult::empty(SourceId::PublicLibrary).with_evidence([format!(
            "no library result for {} variant(s)",
            variants.len()
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;

    const RESULT_PAGE: &str = r#"
        <html><body>
          <div>Ad Library</div>
          <a href="https://www.facebook.com/acmeshoes">Acme Shoes</a>
          <div>Active ads from Acme Shoes</div>
          <div>~1,200 results</div>
          <div>See all ads</div>
        </body></html>
    "#;

    const MENTION_ONLY: &str = r#"
        <html><body><p>acmeshoes.com was mentioned in a news story</p></body></html>
    "#;

    fn domain() -> DomainKey {
        DomainKey::parse("acmeshoes.com").unwrap()
    }

    fn meta_url(query: &str) -> String {
        LibrarySurface::meta_ad_library().search_url(query)
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = LibrarySurface::google_transparency().search_url("acme shoes");
        assert_eq!(
            url,
            "https://adstransparency.google.com/advertiser?advertiser=acme%20shoes"
        );
    }

    #[test]
    fn test_estimate_ad_count() {
        assert_eq!(estimate_ad_count("about 1,200 results and 3 ads"), 1200);
        assert_eq!(estimate_ad_count("no numbers here"), 0);
    }

    #[test]
    fn test_inspect_accepts_token_and_indicator() {
        let lookup = PublicLibraryLookup::new(Arc::new(MockFetcher::new()));
        let surface = LibrarySurface::meta_ad_library();
        let response = FetchResponse::ok(meta_url("acmeshoes.com"), RESULT_PAGE);

        let hit = lookup
            .inspect(&surface, "acmeshoes.com", &domain(), &response)
            .found()
            .unwrap();

        assert!(hit.advertiser_found);
        assert_eq!(hit.estimated_ads, 1200);
        assert!(hit.indicators.contains(&"see all ads".to_string()));
        // 40 + 30 + min(3 × 10, 30)
        assert_eq!(hit.confidence(), 100);
        assert_eq!(hit.score(), 100.0);
    }

    #[test]
    fn test_inspect_rejects_mention_without_indicator() {
        let lookup = PublicLibraryLookup::new(Arc::new(MockFetcher::new()));
        let surface = LibrarySurface::meta_ad_library();
        let response = FetchResponse::ok(meta_url("acmeshoes.com"), MENTION_ONLY);

        let probe = lookup.inspect(&surface, "acmeshoes.com", &domain(), &response);
        assert_eq!(probe, PageProbe::NotFound);
    }

    #[test]
    fn test_hit_score_without_advertiser() {
        let hit = LibraryHit {
            surface: "s".into(),
            query: "q".into(),
            url: "u".into(),
            indicators: vec!["advertiser".into()],
            advertiser_found: false,
            advertiser_names: vec![],
            estimated_ads: 0,
        };
        assert_eq!(hit.confidence(), 10);
        assert_eq!(hit.score(), 44.0);
    }

    #[tokio::test]
    async fn test_first_variant_miss_then_hit() {
        let fetcher = MockFetcher::new()
            .with_page(meta_url("acmeshoes.com"), MENTION_ONLY)
            .with_page(meta_url("acmeshoes"), RESULT_PAGE);
        let lookup = PublicLibraryLookup::new(Arc::new(fetcher.clone()));

        let signal = lookup
            .evaluate(&domain(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(signal.has_signal);
        assert!(signal.evidence.contains(&"query: acmeshoes".to_string()));
        // meta + google for the full domain, then meta for the stripped form
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_no_hit_is_empty_not_failed() {
        let fetcher = MockFetcher::new().with_fallback_page(MENTION_ONLY);
        let lookup = PublicLibraryLookup::new(Arc::new(fetcher));

        let signal = lookup
            .evaluate(&domain(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!signal.has_signal);
        assert!(!signal.is_failed());
        assert_eq!(signal.raw_score, 0.0);
    }

    #[tokio::test]
    async fn test_all_surfaces_down_is_failed() {
        let fetcher = MockFetcher::new().with_fallback_status(503);
        let lookup = PublicLibraryLookup::new(Arc::new(fetcher));

        let signal = lookup
            .evaluate(&domain(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(signal.is_failed());
        assert!(!signal.has_signal);
    }
}
