//! Tracking analyzer: ad-network and conversion artifacts on the homepage.
//!
//! The homepage is fetched over HTTPS (twice, with two header profiles) and
//! then over plain HTTP. When the analyzer is given a total budget, each
//! attempt's timeout is cut to an equal share of it so a hanging HTTPS port
//! cannot starve the HTTP fallback. The markup is scored with five rule
//! groups:
//!
//! | Group | Input | Weight | Cap |
//! |---|---|---|---|
//! | `ad_network_scripts` | raw markup | 15 | 45 |
//! | `campaign_parameters` | raw markup | 10 | 20 |
//! | `conversion_calls` | raw markup | 15 | 45 |
//! | `site_verification` | `<meta>` names | 10 | 20 |
//! | `script_hosts` | `<script src>` hosts | 10 | 20 |
//!
//! Confidence grows with the number of independent groups that fired, not
//! with the score itself: three weak groups are more convincing than one
//! group hit five times.

use async_trait::async_trait;
use lazy_static::lazy_static;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{probe_page, PageProbe};
use crate::error::DetectorResult;
use crate::fetchers::headers::BrowserProfile;
use crate::matcher::html::{script_host, ParsedPage};
use crate::matcher::{MatchOutcome, PatternMatcher, RuleGroup, RuleSet};
use crate::traits::detector::Detector;
use crate::traits::fetcher::{FetchRequest, FetchResponse, Fetcher};
use crate::types::domain::DomainKey;
use crate::types::signal::{SignalResult, SourceId};

/// Hosts of ad networks and tag managers.
pub const AD_NETWORK_HOSTS: &[&str] = &[
    "connect.facebook.net",
    "facebook.net",
    "googleadservices.com",
    "googlesyndication.com",
    "doubleclick.net",
    "googletagmanager.com",
    "google-analytics.com",
    "adnxs.com",
    "analytics.tiktok.com",
    "snap.licdn.com",
    "bat.bing.com",
    "static.ads-twitter.com",
];

/// `<meta>` names that only exist when a site is wired to an ad account.
pub const VERIFICATION_META: &[&str] = &[
    "fb:app_id",
    "fb:pages",
    "facebook-domain-verification",
    "google-site-verification",
];

const CAMPAIGN_PARAMETERS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "gclid=",
    "fbclid=",
    "msclkid=",
];

const CONVERSION_CALLS: &[&str] = &[
    r"fbq\s*\(",
    r"gtag\s*\(",
    r"\bga\s*\(\s*['\x22]",
    r"_fbp\b",
    r"_gcl_",
    r"google_conversion_id",
    r"google_ad_client",
    r"ttq\.track",
    r"uetq\.push",
    r"facebook\.com/tr\b",
];

lazy_static! {
    static ref MARKUP_RULES: RuleSet = RuleSet::new()
        .with_group(RuleGroup::new("ad_network_scripts", 15, 45).with_literals(AD_NETWORK_HOSTS.iter().copied()))
        .with_group(RuleGroup::new("campaign_parameters", 10, 20).with_literals(CAMPAIGN_PARAMETERS.iter().copied()))
        .with_group(
            RuleGroup::new("conversion_calls", 15, 45)
                .with_regexes(CONVERSION_CALLS.iter().copied())
                .unwrap()
        );
}

/// Attempts in order: (scheme, header profile index).
const ATTEMPTS: &[(&str, usize)] = &[("https", 0), ("https", 1), ("http", 0)];

/// Detects ad tracking on a domain's homepage.
pub struct TrackingAnalyzer {
    fetcher: Arc<dyn Fetcher>,
    matcher: PatternMatcher,
    request_timeout: Duration,
    budget: Option<Duration>,
    signal_threshold: f64,
}

impl TrackingAnalyzer {
    /// Create an analyzer with the built-in rules.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            matcher: PatternMatcher::new(MARKUP_RULES.clone()),
            request_timeout: Duration::from_secs(15),
            budget: None,
            signal_threshold: 20.0,
        }
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Total time available for every attempt together.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Timeout for a single attempt: the request timeout, capped at an
    /// equal share of the budget.
    pub fn attempt_timeout(&self) -> Duration {
        match self.budget {
            Some(budget) => {
                let attempts = u32::try_from(ATTEMPTS.len()).unwrap_or(u32::MAX);
                self.request_timeout.min(budget / attempts)
            }
            None => self.request_timeout,
        }
    }

    /// Score strictly above which a signal is reported.
    pub fn with_signal_threshold(mut self, threshold: f64) -> Self {
        self.signal_threshold = threshold;
        self
    }

    /// Replace the markup rules.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.matcher = PatternMatcher::new(rules);
        self
    }

    /// Score a homepage response. Pure; no I/O.
    pub fn analyze(&self, response: &FetchResponse) -> SignalResult {
        let page = match ParsedPage::parse(&response.body, response.content_type.as_deref(), None) {
            Ok(page) => page,
            Err(e) => {
                debug!(url = %response.url, error = %e, "homepage not parseable");
                return SignalResult::empty(SourceId::Tracking)
                    .with_evidence([format!("homepage not parseable: {}", e)]);
            }
        };

        let mut outcome = self.matcher.evaluate(&response.body);

        let verification: Vec<String> = VERIFICATION_META
            .iter()
            .filter(|name| page.meta.iter().any(|m| m.key == **name))
            .map(|name| name.to_string())
            .collect();
        outcome.record("site_verification", verification, 10, 20);

        let mut hosts: Vec<String> = Vec::new();
        for src in &page.scripts {
            let Some(host) = script_host(src) else {
                continue;
            };
            if is_ad_network_host(&host) && !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        outcome.record("script_hosts", hosts, 10, 20);

        self.to_signal(outcome, &response.url)
    }

    fn to_signal(&self, outcome: MatchOutcome, url: &str) -> SignalResult {
        let score = f64::from(outcome.score);
        let groups = u32::try_from(outcome.groups_fired()).unwrap_or(u32::MAX);
        let hits = u32::try_from(outcome.hit_count()).unwrap_or(u32::MAX);
        let confidence = groups.saturating_mul(30).saturating_add(hits.saturating_mul(2));

        SignalResult::empty(SourceId::Tracking)
            .with_score(score)
            .with_confidence(confidence)
            .with_signal(score > self.signal_threshold)
            .with_evidence([format!("homepage: {}", url)])
            .with_evidence(outcome.evidence)
    }
}

fn is_ad_network_host(host: &str) -> bool {
    AD_NETWORK_HOSTS
        .iter()
        .any(|known| host == *known || host.ends_with(&format!(".{}", known)))
}

#[async_trait]
impl Detector for TrackingAnalyzer {
    fn source(&self) -> SourceId {
        SourceId::Tracking
    }

    async fn evaluate(
        &self,
        domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult> {
        let mut last_error: Option<String> = None;
        let timeout = self.attempt_timeout();

        for (scheme, attempt) in ATTEMPTS {
            let url = format!("{}://{}/", scheme, domain);
            let request = FetchRequest::new(&url, timeout)
                .with_profile(BrowserProfile::for_url(&url, *attempt))
                .with_cancel(cancel.child_token());

            match probe_page(self.fetcher.as_ref(), &request).await? {
                PageProbe::Found(response) => {
                    let signal = self.analyze(&response);
                    debug!(
                        domain = %domain,
                        score = signal.raw_score,
                        groups = signal.evidence.len(),
                        "tracking analysis complete"
                    );
                    return Ok(signal);
                }
                PageProbe::NotFound => {
                    last_error = Some(format!("{} returned not found", url));
                }
                PageProbe::Error(message) => {
                    debug!(domain = %domain, url = %url, error = %message, "homepage attempt failed");
                    last_error = Some(message);
                }
            }
        }

        let message = last_error.unwrap_or_else(|| "no attempts made".to_string());
        warn!(domain = %domain, error = %message, "homepage unreachable");
        Ok(SignalResult::failed(
            SourceId::Tracking,
            format!("homepage unreachable: {}", message),
        ))
    }
}
