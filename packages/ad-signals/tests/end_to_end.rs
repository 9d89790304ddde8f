//! End-to-end tests: the three standard detectors against a mocked web.

use ad_signals::{
    testing::MockFetcher, AssessmentEngine, BatchOptions, BatchScheduler, DecisionRule,
    EngineConfig, Fetcher, LibrarySurface, PageTransparencyChecker, Priority, SourceId,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const HOMEPAGE: &str = r#"
    <html><head>
      <meta name="facebook-domain-verification" content="abc123">
      <script async src="https://connect.facebook.net/en_US/fbevents.js"></script>
      <script src="https://www.googletagmanager.com/gtag/js?id=AW-123"></script>
      <script>fbq('init', '123'); gtag('config', 'AW-123');</script>
    </head><body>
      <a href="/sale?utm_source=fb&utm_campaign=spring">Spring sale</a>
    </body></html>
"#;

const PLAIN_HOMEPAGE: &str = r#"
    <html><body><h1>Welcome</h1><p>Handmade furniture since 1982.</p></body></html>
"#;

const LIBRARY_RESULTS: &str = r#"
    <html><body>
      <a href="https://www.facebook.com/acmeshoes">Acme Shoes</a>
      <div>Active ads from Acme Shoes</div>
      <div>~1,200 results</div>
      <div>See all ads</div>
    </body></html>
"#;

const PAGE_SEARCH: &str = r#"
    <html><body>
      <a href="/acmeshoes">AcmeShoes Official</a>
      <a href="/help">Help Center</a>
    </body></html>
"#;

const OFFICIAL_PAGE: &str = r#"
    <html><body>
      <h1>Acme Shoes</h1>
      <p>Official page of acmeshoes.com</p>
      <section>Page transparency: This page is currently running ads.</section>
    </body></html>
"#;

/// A web where acmeshoes.com advertises everywhere and plainwood.com
/// nowhere.
fn mocked_web() -> MockFetcher {
    let checker = PageTransparencyChecker::new(Arc::new(MockFetcher::new()));
    MockFetcher::new()
        .with_page("https://acmeshoes.com/", HOMEPAGE)
        .with_page(
            LibrarySurface::meta_ad_library().search_url("acmeshoes.com"),
            LIBRARY_RESULTS,
        )
        .with_page(checker.search_url("acmeshoes.com"), PAGE_SEARCH)
        .with_page("https://www.facebook.com/acmeshoes", OFFICIAL_PAGE)
        .with_page("https://plainwood.com/", PLAIN_HOMEPAGE)
}

fn engine(fetcher: MockFetcher) -> AssessmentEngine {
    let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
    AssessmentEngine::with_defaults(fetcher, EngineConfig::default()).unwrap()
}

#[tokio::test]
async fn test_advertiser_found_by_every_detector() {
    let assessment = engine(mocked_web()).assess("https://www.acmeshoes.com/").await;

    assert_eq!(assessment.domain, "acmeshoes.com");
    assert_eq!(assessment.composite.methods_detected, 3);
    assert!(assessment.composite.decision);
    assert!(assessment
        .composite
        .triggered_rules
        .contains(&DecisionRule::LibrarySignal));
    assert!(assessment
        .composite
        .triggered_rules
        .contains(&DecisionRule::StrongTracking));
    assert!(assessment.composite.per_source_scores[&SourceId::Tracking] > 60.0);
    assert!(assessment.priority.warrants_paid_verification());
    assert!(assessment.signals.iter().all(|s| !s.is_failed()));

    let tracking = assessment
        .signals
        .iter()
        .find(|s| s.source_id == SourceId::Tracking)
        .unwrap();
    assert_eq!(tracking.evidence[0], "homepage: https://acmeshoes.com/");
    assert!(tracking.evidence.iter().any(|e| e.contains("connect.facebook.net")));
}

#[tokio::test]
async fn test_quiet_site_scores_zero() {
    let assessment = engine(mocked_web()).assess("plainwood.com").await;

    assert_eq!(assessment.weighted_score(), 0.0);
    assert!(!assessment.composite.decision);
    assert_eq!(assessment.priority, Priority::Low);
    assert!(assessment.signals.iter().all(|s| !s.is_failed()));
}

#[tokio::test]
async fn test_unreachable_web_degrades_per_detector() {
    let fetcher = MockFetcher::new().with_fallback_status(503);
    let assessment = engine(fetcher).assess("down.example").await;

    assert!(!assessment.is_degraded());
    assert_eq!(assessment.weighted_score(), 0.0);

    let failed: Vec<SourceId> = assessment
        .signals
        .iter()
        .filter(|s| s.is_failed())
        .map(|s| s.source_id)
        .collect();
    assert!(failed.contains(&SourceId::Tracking));
    assert!(failed.contains(&SourceId::PublicLibrary));
}

#[tokio::test]
async fn test_tracking_falls_back_to_http() {
    let fetcher = MockFetcher::new()
        .with_connection_error("https://legacy.example/")
        .with_page("http://legacy.example/", HOMEPAGE);

    let assessment = engine(fetcher.clone()).assess("legacy.example").await;

    let tracking = assessment
        .signals
        .iter()
        .find(|s| s.source_id == SourceId::Tracking)
        .unwrap();
    assert!(tracking.has_signal);
    assert!(fetcher.calls().contains(&"http://legacy.example/".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_tracking_fallback_survives_hanging_https() {
    let fetcher = MockFetcher::new()
        .with_hang("https://legacy.example/")
        .with_page("http://legacy.example/", HOMEPAGE);

    let assessment = engine(fetcher.clone()).assess("legacy.example").await;

    let tracking = assessment
        .signals
        .iter()
        .find(|s| s.source_id == SourceId::Tracking)
        .unwrap();
    assert!(tracking.error.is_none(), "tracking failed: {:?}", tracking.error);
    assert!(tracking.has_signal);
    assert_eq!(
        fetcher.calls().iter().filter(|u| u.as_str() == "https://legacy.example/").count(),
        2
    );
    assert!(fetcher.calls().contains(&"http://legacy.example/".to_string()));
}

#[tokio::test]
async fn test_batch_over_mocked_web() {
    let scheduler = BatchScheduler::new(Arc::new(engine(mocked_web())));

    let report = scheduler
        .assess_batch(
            &["plainwood.com", "acmeshoes.com", "ACMESHOES.com"],
            &BatchOptions::new().with_max_concurrency(2),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.count, 2);
    assert_eq!(report.results[0].domain, "acmeshoes.com");
    assert_eq!(report.results[1].domain, "plainwood.com");
    assert_eq!(report.priority_histogram.total(), 2);
    let threshold = scheduler.engine().config().policy.paid_api_threshold;
    let paid_api = report.paid_api_summary(threshold);
    assert_eq!(paid_api.threshold, 50.0);
    assert_eq!(paid_api.candidates, 1);
    assert_eq!(paid_api.estimated_savings_pct, 50.0);
}
