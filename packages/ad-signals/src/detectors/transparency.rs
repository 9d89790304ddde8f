//! Page-transparency checker.
//!
//! Social pages that run ads show a transparency panel ("this page is
//! currently running ads"). The checker searches for a page belonging to
//! the domain, confirms the page's identity, then looks for those
//! disclosures.
//!
//! A candidate page is only accepted when at least one identity form of
//! the domain (full domain, domain without TLD, first label) appears in its
//! text, worth 25 points each. Pages under the identity threshold are
//! rejected and the next candidate is tried.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
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

/// Phrases a transparency panel uses to say ads are running.
pub const DISCLOSURE_PHRASES: &[&str] = &[
    "tiene anuncios en circulación",
    "anuncios en circulación",
    "ads are running",
    "is currently running ads",
    "transparencia de la página",
    "page transparency",
    "información de anuncios",
    "ad information",
];

const DISCLOSURE_POINTS: u32 = 20;
const SECTION_POINTS: u32 = 15;
const IDENTITY_POINTS: u32 = 25;

lazy_static! {
    static ref SECTION_MARKER: Regex =
        Regex::new(r"(?i)\b(transparencia|transparency|anuncios|ads)\b").unwrap();
}

/// Result of inspecting one candidate page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageCheck {
    pub page_url: String,

    /// Disclosure phrases found
    pub disclosures: Vec<String>,

    /// A transparency/ads section marker is present
    pub has_section: bool,

    /// Identity forms of the domain found in the page
    pub identity_matches: Vec<String>,

    /// Disclosure points plus identity points, capped at 100
    pub confidence: u32,
}

impl PageCheck {
    /// Whether the page discloses active ads.
    pub fn has_ads(&self) -> bool {
        !self.disclosures.is_empty()
    }

    pub fn identity_confidence(&self) -> u32 {
        u32::try_from(self.identity_matches.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(IDENTITY_POINTS)
    }

    fn evidence(&self) -> Vec<String> {
        let mut evidence = vec![format!("page: {}", self.page_url)];
        evidence.extend(self.disclosures.iter().map(|d| format!("disclosure: {}", d)));
        if self.has_section {
            evidence.push("transparency section present".to_string());
        }
        evidence.extend(
            self.identity_matches
                .iter()
                .map(|form| format!("identity: {}", form)),
        );
        evidence
    }

    fn into_signal(self) -> SignalResult {
        let has_ads = self.has_ads();
        let confidence = self.confidence;
        SignalResult::empty(SourceId::PageTransparency)
            .with_score(f64::from(confidence))
            .with_confidence(confidence)
            .with_signal(has_ads)
            .with_evidence(self.evidence())
    }
}

/// Finds a domain's social page and checks its ad disclosures.
pub struct PageTransparencyChecker {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    search_template: String,
    request_timeout: Duration,
    identity_threshold: u32,
    early_stop_confidence: u32,
    max_candidates: usize,
}

impl PageTransparencyChecker {
    /// Create a checker against facebook.com page search.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: "https://www.facebook.com".to_string(),
            search_template: "https://www.facebook.com/search/pages/?q={query}".to_string(),
            request_timeout: Duration::from_secs(15),
            identity_threshold: 25,
            early_stop_confidence: 80,
            max_candidates: 5,
        }
    }

    /// Point the checker at another site. The template must contain
    /// `{query}`.
    pub fn with_search(mut self, base_url: impl Into<String>, search_template: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.search_template = search_template.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Minimum identity points for a page to be accepted.
    pub fn with_identity_threshold(mut self, threshold: u32) -> Self {
        self.identity_threshold = threshold;
        self
    }

    /// Confidence at which the variant search stops.
    pub fn with_early_stop(mut self, confidence: u32) -> Self {
        self.early_stop_confidence = confidence;
        self
    }

    /// Maximum candidate pages taken from one search result page.
    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    /// Search URL for a query term.
    pub fn search_url(&self, query: &str) -> String {
        self.search_template
            .replace("{query}", &urlencoding::encode(query))
    }

    /// Candidate page links from a search result page, deduplicated and
    /// capped.
    pub fn candidate_links(&self, response: &FetchResponse, query: &str, domain: &DomainKey) -> Vec<String> {
        let base = Url::parse(&response.url)
            .or_else(|_| Url::parse(&self.base_url))
            .ok();
        let page = match ParsedPage::parse(&response.body, response.content_type.as_deref(), base.as_ref()) {
            Ok(page) => page,
            Err(_) => return Vec::new(),
        };

        let terms = [query.to_lowercase(), domain.root().to_string()];
        let mut candidates: Vec<String> = Vec::new();
        for link in &page.links {
            if !(link.href.starts_with("https://") || link.href.starts_with("http://")) {
                continue;
            }
            let href = link.href.to_lowercase();
            let text = link.text.to_lowercase();
            let relevant_href = href.contains("/pages/") || terms.iter().any(|t| href.contains(t.as_str()));
            let relevant_text = terms.iter().any(|t| text.contains(t.as_str()));
            if relevant_href && relevant_text && !candidates.contains(&link.href) {
                candidates.push(link.href.clone());
            }
            if candidates.len() >= self.max_candidates {
                break;
            }
        }
        candidates
    }

    /// Inspect a fetched page. Pure; no I/O. `NotFound` when the identity
    /// check fails.
    pub fn inspect(&self, response: &FetchResponse, domain: &DomainKey) -> PageProbe<PageCheck> {
        let page = match ParsedPage::parse(&response.body, response.content_type.as_deref(), None) {
            Ok(page) => page,
            Err(_) => return PageProbe::NotFound,
        };
        let text = page.text_lower();

        let identity_matches: Vec<String> = domain
            .identity_forms()
            .into_iter()
            .filter(|form| text.contains(form.as_str()))
            .collect();
        let identity = u32::try_from(identity_matches.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(IDENTITY_POINTS);
        if identity < self.identity_threshold.max(1) {
            debug!(url = %response.url, identity, "identity check failed");
            return PageProbe::NotFound;
        }

        let disclosures: Vec<String> = DISCLOSURE_PHRASES
            .iter()
            .filter(|phrase| text.contains(**phrase))
            .map(|phrase| phrase.to_string())
            .collect();
        let has_section = SECTION_MARKER.is_match(&text);

        let disclosure = u32::try_from(disclosures.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(DISCLOSURE_POINTS)
            .saturating_add(if has_section { SECTION_POINTS } else { 0 });

        PageProbe::Found(PageCheck {
            page_url: response.url.clone(),
            disclosures,
            has_section,
            identity_matches,
            confidence: disclosure.saturating_add(identity).min(100),
        })
    }

    /// Check a known page URL directly, with the same identity gate.
    pub async fn check_page(
        &self,
        url: &str,
        domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<PageProbe<PageCheck>> {
        let request = FetchRequest::new(url, self.request_timeout)
            .with_profile(BrowserProfile::for_url(url, 0))
            .with_header("Referer", format!("{}/", self.base_url))
            .with_cancel(cancel.child_token());

        Ok(match probe_page(self.fetcher.as_ref(), &request).await? {
            PageProbe::Found(response) => self.inspect(&response, domain),
            PageProbe::NotFound => PageProbe::NotFound,
            PageProbe::Error(message) => PageProbe::Error(message),
        })
    }

    /// First identity-confirmed page among the candidates for one query.
    async fn search_variant(
        &self,
        query: &str,
        domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<Option<PageCheck>> {
        let url = self.search_url(query);
        let request = FetchRequest::new(&url, self.request_timeout)
            .with_profile(BrowserProfile::for_url(&url, 0))
            .with_cancel(cancel.child_token());

        let response = match probe_page(self.fetcher.as_ref(), &request).await? {
            PageProbe::Found(response) => response,
            PageProbe::NotFound => return Ok(None),
            PageProbe::Error(message) => {
                debug!(query = %query, error = %message, "page search failed");
                return Ok(None);
            }
        };

        for candidate in self.candidate_links(&response, query, domain) {
            if let PageProbe::Found(check) = self.check_page(&candidate, domain, cancel).await? {
                return Ok(Some(check));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Detector for PageTransparencyChecker {
    fn source(&self) -> SourceId {
        SourceId::PageTransparency
    }

    async fn evaluate(
        &self,
        domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        let variants = domain.search_variants();
        let mut best: Option<PageCheck> = None;

        for variant in &variants {
            if let Some(check) = self.search_variant(variant, domain, cancel).await? {
                let better = best
                    .as_ref()
                    .map(|current| check.confidence > current.confidence)
                    .unwrap_or(true);
                if better {
                    best = Some(check);
                }
            }

            if best
                .as_ref()
                .is_some_and(|b| b.confidence >= self.early_stop_confidence)
            {
                debug!(domain = %domain, query = %variant, "transparency search stopped early");
                break;
            }
        }

        match best {
            Some(check) => {
                info!(
                    domain = %domain,
                    page = %check.page_url,
                    confidence = check.confidence,
                    has_ads = check.has_ads(),
                    "transparency page confirmed"
                );
                Ok(check.into_signal())
            }
            None => Ok(SignalResult::empty(SourceId::PageTransparency).with_evidence([format!(
                "no identity-confirmed page across {} variant(s)",
                variants.len()
            )])),
        }
    }
}
