//! Integration tests for the aggregation engine.
//!
//! Detector outputs are pinned with the mocks from `ad_signals::testing`
//! so every scenario is deterministic.

use ad_signals::{
    testing::{FailingDetector, PanickingDetector, StaticDetector},
    AssessmentEngine, ConfidenceTier, Priority, SignalResult, SourceId,
};

fn scored(source: SourceId, score: f64, has_signal: bool) -> SignalResult {
    SignalResult::empty(source)
        .with_score(score)
        .with_signal(has_signal)
}

#[tokio::test]
async fn test_nothing_found_is_negative() {
    let engine = AssessmentEngine::builder()
        .detector(StaticDetector::new(SignalResult::empty(SourceId::Tracking)))
        .detector(StaticDetector::new(SignalResult::empty(SourceId::PublicLibrary)))
        .detector(StaticDetector::new(SignalResult::empty(SourceId::PageTransparency)))
        .build()
        .unwrap();

    let assessment = engine.assess("quiet.example").await;

    assert_eq!(assessment.weighted_score(), 0.0);
    assert!(!assessment.composite.decision);
    assert!(assessment.composite.triggered_rules.is_empty());
    assert_eq!(assessment.priority, Priority::Low);
    assert_eq!(assessment.composite.confidence_tier, ConfidenceTier::VeryLow);
    assert_eq!(assessment.signals.len(), 3);
    assert!(!assessment.is_degraded());
}

#[tokio::test]
async fn test_failure_equals_forced_zero() {
    let failing = AssessmentEngine::builder()
        .detector(StaticDetector::new(scored(SourceId::Tracking, 45.0, true)))
        .detector(FailingDetector::new(SourceId::PublicLibrary, "upstream down"))
        .detector(StaticDetector::new(scored(SourceId::PageTransparency, 50.0, true)))
        .build()
        .unwrap();
    let zeroed = AssessmentEngine::builder()
        .detector(StaticDetector::new(scored(SourceId::Tracking, 45.0, true)))
        .detector(StaticDetector::new(SignalResult::empty(SourceId::PublicLibrary)))
        .detector(StaticDetector::new(scored(SourceId::PageTransparency, 50.0, true)))
        .build()
        .unwrap();

    let with_failure = failing.assess("isolated.example").await;
    let baseline = zeroed.assess("isolated.example").await;

    assert_eq!(with_failure.composite.per_source_scores, baseline.composite.per_source_scores);
    assert_eq!(with_failure.weighted_score(), baseline.weighted_score());
    assert_eq!(with_failure.composite.decision, baseline.composite.decision);
    assert_eq!(with_failure.priority, baseline.priority);
}

#[tokio::test]
async fn test_panicking_detector_does_not_escape() {
    let engine = AssessmentEngine::builder()
        .detector(StaticDetector::new(scored(SourceId::Tracking, 30.0, true)))
        .detector(PanickingDetector::new(SourceId::PublicLibrary))
        .detector(StaticDetector::new(SignalResult::empty(SourceId::PageTransparency)))
        .build()
        .unwrap();

    let assessment = engine.assess("panic.example").await;

    // 0.5 x 30 reaches the composite threshold exactly
    assert_eq!(assessment.weighted_score(), 15.0);
    assert!(assessment.composite.decision);
    let library = assessment
        .signals
        .iter()
        .find(|s| s.source_id == SourceId::PublicLibrary)
        .unwrap();
    assert!(library.error.as_deref().unwrap().contains("panicked"));
    assert_eq!(library.raw_score, 0.0);
}

#[tokio::test]
async fn test_every_detector_failing_still_assesses() {
    let engine = AssessmentEngine::builder()
        .detector(FailingDetector::new(SourceId::Tracking, "dns"))
        .detector(FailingDetector::new(SourceId::PublicLibrary, "blocked"))
        .detector(PanickingDetector::new(SourceId::PageTransparency))
        .build()
        .unwrap();

    let assessment = engine.assess("broken.example").await;

    assert_eq!(assessment.weighted_score(), 0.0);
    assert!(!assessment.composite.decision);
    assert!(assessment.signals.iter().all(|s| s.is_failed()));
    assert!(!assessment.recommendation.is_empty());
}

#[tokio::test]
async fn test_weak_tracking_lifts_tier_without_signal() {
    let engine = AssessmentEngine::builder()
        .detector(StaticDetector::new(scored(SourceId::Tracking, 20.0, false)))
        .detector(StaticDetector::new(scored(SourceId::PublicLibrary, 35.0, false)))
        .detector(StaticDetector::new(scored(SourceId::PageTransparency, 60.0, true)))
        .build()
        .unwrap();

    let assessment = engine.assess("weak.example").await;

    assert_eq!(assessment.weighted_score(), 22.0);
    assert_eq!(assessment.composite.confidence_tier, ConfidenceTier::Low);
    assert_eq!(assessment.composite.per_source_scores[&SourceId::PublicLibrary], 0.0);
    assert_eq!(assessment.composite.methods_detected, 1);
    assert!(assessment.composite.decision);
}
