//! Aggregation engine: run every detector for one domain and combine.
//!
//! Per domain the engine moves through `Pending → Collected → Scored →
//! Done` in a single pass. All detectors run concurrently and the engine
//! waits for every one of them; a detector that errors, panics or blows
//! its time budget is recorded as a failed signal (score 0, error set) and
//! the others are still scored.
//!
//! ```text
//! weighted = Σ weight(source) × contribution(source)
//! decision = library signal
//!         OR page-transparency signal
//!         OR weighted ≥ decision threshold (15)
//!         OR tracking raw score > strong-tracking threshold (60)
//! ```

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::detectors::{PageTransparencyChecker, PublicLibraryLookup, TrackingAnalyzer};
use crate::error::{DetectorError, EngineError, Result};
use crate::pipeline::advice;
use crate::traits::clock::{Clock, SystemClock};
use crate::traits::detector::Detector;
use crate::traits::fetcher::Fetcher;
use crate::types::assessment::{
    CompositeScore, ConfidenceTier, DecisionRule, DomainAssessment, Priority,
};
use crate::types::config::{EngineConfig, ScoringPolicy};
use crate::types::domain::DomainKey;
use crate::types::signal::{SignalResult, SourceId};

/// Combine signals into a composite score.
///
/// Sources without a result contribute 0, as do failed sources and lookup
/// sources that did not signal. Tracking counts with its raw score. If a
/// source appears more than once, its highest contribution is used.
pub fn score_signals(signals: &[SignalResult], policy: &ScoringPolicy) -> CompositeScore {
    let mut per_source_scores: BTreeMap<SourceId, f64> =
        SourceId::ALL.iter().map(|source| (*source, 0.0)).collect();
    for signal in signals {
        let entry = per_source_scores.entry(signal.source_id).or_insert(0.0);
        *entry = entry.max(signal.contribution());
    }

    let raw: f64 = per_source_scores
        .iter()
        .map(|(source, score)| policy.weights.weight(*source) * score)
        .sum();
    let weighted_score = round_score(raw);

    let signalled = |source: SourceId| {
        signals
            .iter()
            .any(|s| s.source_id == source && s.has_signal && !s.is_failed())
    };

    let methods_detected = SourceId::ALL.iter().filter(|s| signalled(**s)).count();

    let mut strongest_source = SourceId::Tracking;
    let mut strongest_score = f64::NEG_INFINITY;
    for source in SourceId::ALL {
        let score = per_source_scores.get(&source).copied().unwrap_or(0.0);
        if score > strongest_score {
            strongest_source = source;
            strongest_score = score;
        }
    }

    let tracking_raw = signals
        .iter()
        .filter(|s| s.source_id == SourceId::Tracking && !s.is_failed())
        .map(|s| s.raw_score)
        .fold(0.0, f64::max);

    let mut triggered_rules = Vec::new();
    if signalled(SourceId::PublicLibrary) {
        triggered_rules.push(DecisionRule::LibrarySignal);
    }
    if signalled(SourceId::PageTransparency) {
        triggered_rules.push(DecisionRule::SecondarySignal);
    }
    if weighted_score >= policy.decision_threshold {
        triggered_rules.push(DecisionRule::CompositeThreshold);
    }
    if tracking_raw > policy.strong_tracking_threshold {
        triggered_rules.push(DecisionRule::StrongTracking);
    }

    CompositeScore {
        per_source_scores,
        weighted_score,
        methods_detected,
        strongest_source,
        decision: !triggered_rules.is_empty(),
        triggered_rules,
        confidence_tier: ConfidenceTier::from_score(weighted_score, &policy.tier_bands),
    }
}

/// One decimal place, clamped to 0-100.
fn round_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    ((score * 10.0).round() / 10.0).clamp(0.0, 100.0)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Scores domains with a fixed set of detectors.
///
/// # Example
///
/// ```rust,ignore
/// let engine = AssessmentEngine::with_defaults(fetcher, EngineConfig::default())?;
/// let assessment = engine.assess("https://www.example.com/").await;
/// println!("{} -> {}", assessment.domain, assessment.composite.weighted_score);
/// ```
pub struct AssessmentEngine {
    detectors: Vec<Arc<dyn Detector>>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl AssessmentEngine {
    /// Start building an engine.
    pub fn builder() -> AssessmentEngineBuilder {
        AssessmentEngineBuilder::default()
    }

    /// Engine with the three standard detectors sharing one fetcher.
    pub fn with_defaults(fetcher: Arc<dyn Fetcher>, config: EngineConfig) -> Result<Self> {
        let timeout = config.fetch.request_timeout();
        let policy = &config.policy;

        let tracking = TrackingAnalyzer::new(fetcher.clone())
            .with_request_timeout(timeout)
            .with_budget(config.budgets.budget(SourceId::Tracking))
            .with_signal_threshold(policy.tracking_signal_threshold);
        let library = PublicLibraryLookup::new(fetcher.clone()).with_request_timeout(timeout);
        let transparency = PageTransparencyChecker::new(fetcher)
            .with_request_timeout(timeout)
            .with_identity_threshold(policy.identity_threshold)
            .with_early_stop(policy.early_stop_confidence);

        Self::builder()
            .detector(tracking)
            .detector(library)
            .detector(transparency)
            .config(config)
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sources of the registered detectors, in registration order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.detectors.iter().map(|d| d.source()).collect()
    }

    /// Assess one domain. Never fails: problems show up as failed signals or
    /// a degraded assessment.
    pub async fn assess(&self, domain: &str) -> DomainAssessment {
        self.assess_with_cancel(domain, &CancellationToken::new()).await
    }

    /// Assess one domain, abandoning in-flight detectors when `cancel` fires.
    pub async fn assess_with_cancel(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> DomainAssessment {
        let Some(key) = DomainKey::parse(domain) else {
            let error = EngineError::EmptyDomain {
                input: domain.to_string(),
            };
            warn!(input = %domain, "empty domain");
            return self.degraded(domain, &error);
        };

        match self.assess_key(&key, cancel).await {
            Ok(assessment) => assessment,
            Err(e) => self.degraded(key.as_str(), &e),
        }
    }

    /// Assess a normalized domain. Only cancellation returns `Err`.
    pub async fn assess_key(
        &self,
        key: &DomainKey,
        cancel: &CancellationToken,
    ) -> Result<DomainAssessment> {
        let started = Instant::now();
        debug!(domain = %key, detectors = self.detectors.len(), state = "pending", "assessment starting");

        let runs = self
            .detectors
            .iter()
            .map(|detector| self.run_detector(detector.as_ref(), key, cancel));
        let signals: Vec<SignalResult> = join_all(runs).await;

        if cancel.is_cancelled() {
            warn!(domain = %key, "assessment cancelled");
            return Err(EngineError::Cancelled);
        }
        debug!(domain = %key, state = "collected", "signals collected");

        let composite = score_signals(&signals, &self.config.policy);
        debug!(
            domain = %key,
            state = "scored",
            weighted_score = composite.weighted_score,
            decision = composite.decision,
            "signals scored"
        );

        let priority = Priority::from_score(composite.weighted_score, &self.config.policy.priority_bands);
        let assessment = DomainAssessment {
            domain: key.as_str().to_string(),
            recommendation: advice::recommendation(priority).to_string(),
            next_steps: advice::next_steps(priority),
            composite,
            priority,
            signals,
            assessed_at: self.clock.now(),
            error: None,
        };

        info!(
            domain = %key,
            state = "done",
            score = assessment.composite.weighted_score,
            priority = %assessment.priority,
            methods = assessment.composite.methods_detected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "assessment complete"
        );
        Ok(assessment)
    }

    /// Zero-score assessment carrying an error marker.
    pub fn degraded(&self, domain: &str, error: &EngineError) -> DomainAssessment {
        let composite = score_signals(&[], &self.config.policy);
        let priority = Priority::from_score(composite.weighted_score, &self.config.policy.priority_bands);
        DomainAssessment {
            domain: DomainKey::parse(domain)
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| domain.to_string()),
            composite,
            priority,
            recommendation: advice::DEGRADED_RECOMMENDATION.to_string(),
            next_steps: Vec::new(),
            signals: Vec::new(),
            assessed_at: self.clock.now(),
            error: Some(error.to_string()),
        }
    }

    /// Run one detector inside its budget, converting every failure mode
    /// into a failed signal.
    async fn run_detector(
        &self,
        detector: &dyn Detector,
        key: &DomainKey,
        cancel: &CancellationToken,
    ) -> SignalResult {
        let source = detector.source();
        let budget = self.config.budgets.budget(source);
        let started = Instant::now();

        let guarded = AssertUnwindSafe(detector.evaluate(key, cancel)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return SignalResult::failed(source, DetectorError::Cancelled.to_string());
            }
            outcome = tokio::time::timeout(budget, guarded) => outcome,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let signal = match outcome {
            Ok(Ok(Ok(mut signal))) => {
                if signal.source_id != source {
                    warn!(source = %source, reported = %signal.source_id, "detector reported wrong source");
                    signal.source_id = source;
                }
                if signal.is_failed() {
                    signal.raw_score = 0.0;
                    signal.has_signal = false;
                }
                signal
            }
            Ok(Ok(Err(e))) => {
                warn!(domain = %key, source = %source, error = %e, "detector failed");
                SignalResult::failed(source, e.to_string())
            }
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                warn!(domain = %key, source = %source, panic = %message, "detector panicked");
                SignalResult::failed(source, format!("{} detector panicked: {}", source, message))
            }
            Err(_) => {
                warn!(domain = %key, source = %source, budget_secs = budget.as_secs(), "detector timed out");
                SignalResult::failed(
                    source,
                    format!("{} detector timed out after {}s", source, budget.as_secs()),
                )
            }
        };

        debug!(
            domain = %key,
            source = %source,
            score = signal.raw_score,
            has_signal = signal.has_signal,
            failed = signal.is_failed(),
            elapsed_ms,
            "detector finished"
        );
        signal
    }
}

/// Builder for [`AssessmentEngine`].
pub struct AssessmentEngineBuilder {
    detectors: Vec<Arc<dyn Detector>>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl Default for AssessmentEngineBuilder {
    fn default() -> Self {
        Self {
            detectors: Vec::new(),
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl AssessmentEngineBuilder {
    /// Register a detector.
    pub fn detector(self, detector: impl Detector + 'static) -> Self {
        self.shared_detector(Arc::new(detector))
    }

    /// Register a detector that is also held elsewhere.
    pub fn shared_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the scoring policy only.
    pub fn policy(mut self, policy: ScoringPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate and build. Each source may be registered once.
    pub fn build(self) -> Result<AssessmentEngine> {
        if self.detectors.is_empty() {
            return Err(EngineError::NoDetectors);
        }
        let mut seen: Vec<SourceId> = Vec::new();
        for detector in &self.detectors {
            let source = detector.source();
            if seen.contains(&source) {
                return Err(EngineError::DuplicateSource(source));
            }
            seen.push(source);
        }
        self.config.policy.validate()?;

        Ok(AssessmentEngine {
            detectors: self.detectors,
            config: self.config,
            clock: self.clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingDetector, FixedClock, PanickingDetector, StaticDetector};
    use crate::types::config::DetectorBudgets;
    use chrono::TimeZone;
    use std::time::Duration;

    fn signal(source: SourceId, score: f64, has_signal: bool) -> SignalResult {
        SignalResult::empty(source)
            .with_score(score)
            .with_signal(has_signal)
    }

    fn engine_with(signals: [SignalResult; 3]) -> AssessmentEngine {
        let mut builder = AssessmentEngine::builder();
        for s in signals {
            builder = builder.detector(StaticDetector::new(s));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_score_all_zero() {
        let composite = score_signals(&[], &ScoringPolicy::default());
        assert_eq!(composite.weighted_score, 0.0);
        assert!(!composite.decision);
        assert_eq!(composite.methods_detected, 0);
        assert_eq!(composite.strongest_source, SourceId::Tracking);
        assert_eq!(composite.confidence_tier, ConfidenceTier::VeryLow);
        assert_eq!(composite.per_source_scores.len(), 3);
    }

    #[test]
    fn test_score_weighted_sum() {
        let signals = [
            signal(SourceId::Tracking, 50.0, true),
            signal(SourceId::PublicLibrary, 70.0, true),
            signal(SourceId::PageTransparency, 90.0, true),
        ];
        let composite = score_signals(&signals, &ScoringPolicy::default());
        // 25 + 21 + 18
        assert_eq!(composite.weighted_score, 64.0);
        assert_eq!(composite.methods_detected, 3);
        assert_eq!(composite.strongest_source, SourceId::PageTransparency);
        assert_eq!(composite.confidence_tier, ConfidenceTier::High);
    }

    #[test]
    fn test_no_signal_contributes_zero() {
        let signals = [
            signal(SourceId::PublicLibrary, 50.0, false),
            signal(SourceId::PageTransparency, 60.0, false),
        ];
        let composite = score_signals(&signals, &ScoringPolicy::default());
        assert_eq!(composite.weighted_score, 0.0);
        assert!(!composite.decision);
    }

    #[test]
    fn test_weak_tracking_counts_toward_composite() {
        let signals = [
            signal(SourceId::Tracking, 20.0, false),
            signal(SourceId::PageTransparency, 60.0, true),
        ];
        let composite = score_signals(&signals, &ScoringPolicy::default());
        // 0.5 x 20 + 0.2 x 60
        assert_eq!(composite.weighted_score, 22.0);
        assert_eq!(composite.confidence_tier, ConfidenceTier::Low);
        assert_eq!(composite.methods_detected, 1);
        assert_eq!(composite.per_source_scores[&SourceId::Tracking], 20.0);
    }

    #[test]
    fn test_rounding_to_one_decimal() {
        let signals = [signal(SourceId::PublicLibrary, 33.33, true)];
        let composite = score_signals(&signals, &ScoringPolicy::default());
        assert_eq!(composite.weighted_score, 10.0);
    }

    #[test]
    fn test_strongest_source_tie_goes_to_table_order() {
        let signals = [
            signal(SourceId::PublicLibrary, 40.0, true),
            signal(SourceId::PageTransparency, 40.0, true),
        ];
        let composite = score_signals(&signals, &ScoringPolicy::default());
        assert_eq!(composite.strongest_source, SourceId::PublicLibrary);
    }

    #[test]
    fn test_secondary_signal_rule() {
        let signals = [signal(SourceId::PageTransparency, 30.0, true)];
        let composite = score_signals(&signals, &ScoringPolicy::default());
        assert_eq!(composite.weighted_score, 6.0);
        assert!(composite.decision);
        assert_eq!(composite.triggered_rules, vec![DecisionRule::SecondarySignal]);
    }

    #[test]
    fn test_builder_rejects_duplicates_and_empty() {
        assert!(matches!(
            AssessmentEngine::builder().build(),
            Err(EngineError::NoDetectors)
        ));

        let result = AssessmentEngine::builder()
            .detector(StaticDetector::new(SignalResult::empty(SourceId::Tracking)))
            .detector(StaticDetector::new(SignalResult::empty(SourceId::Tracking)))
            .build();
        assert!(matches!(
            result,
            Err(EngineError::DuplicateSource(SourceId::Tracking))
        ));
    }

    #[test]
    fn test_builder_validates_policy() {
        let mut policy = ScoringPolicy::default();
        policy.weights.tracking = 0.9;
        let result = AssessmentEngine::builder()
            .detector(StaticDetector::new(SignalResult::empty(SourceId::Tracking)))
            .policy(policy)
            .build();
        assert!(matches!(result, Err(EngineError::InvalidPolicy { .. })));
    }

    #[tokio::test]
    async fn test_assess_tracking_override_scenario() {
        let engine = engine_with([
            signal(SourceId::Tracking, 70.0, true),
            signal(SourceId::PublicLibrary, 0.0, false),
            signal(SourceId::PageTransparency, 0.0, false),
        ]);
        let assessment = engine.assess("https://www.Shop.example/").await;

        assert_eq!(assessment.domain, "shop.example");
        assert_eq!(assessment.weighted_score(), 35.0);
        assert!(assessment.composite.decision);
        assert!(assessment
            .composite
            .triggered_rules
            .contains(&DecisionRule::StrongTracking));
        assert_eq!(assessment.priority, Priority::Medium);
        assert_eq!(assessment.next_steps.len(), 4);
    }

    #[tokio::test]
    async fn test_assess_library_override_scenario() {
        let engine = engine_with([
            signal(SourceId::Tracking, 0.0, false),
            signal(SourceId::PublicLibrary, 40.0, true),
            signal(SourceId::PageTransparency, 0.0, false),
        ]);
        let assessment = engine.assess("example.com").await;

        assert_eq!(assessment.weighted_score(), 12.0);
        assert!(assessment.composite.decision);
        assert_eq!(
            assessment.composite.triggered_rules,
            vec![DecisionRule::LibrarySignal]
        );
        assert_eq!(assessment.priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_failing_detector_is_isolated() {
        let engine = AssessmentEngine::builder()
            .detector(StaticDetector::new(signal(SourceId::Tracking, 40.0, true)))
            .detector(FailingDetector::new(SourceId::PublicLibrary, "boom"))
            .detector(PanickingDetector::new(SourceId::PageTransparency))
            .build()
            .unwrap();

        let assessment = engine.assess("example.com").await;

        assert_eq!(assessment.weighted_score(), 20.0);
        assert!(assessment.composite.decision);
        assert!(!assessment.is_degraded());
        let failed: Vec<_> = assessment.signals.iter().filter(|s| s.is_failed()).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().any(|s| s
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("panicked")));
    }

    #[tokio::test]
    async fn test_budget_timeout_becomes_failed_signal() {
        let budgets = DetectorBudgets {
            tracking_secs: 1,
            ..DetectorBudgets::default()
        };
        let engine = AssessmentEngine::builder()
            .detector(
                StaticDetector::new(signal(SourceId::Tracking, 90.0, true))
                    .with_delay(Duration::from_secs(30)),
            )
            .config(EngineConfig::default().with_budgets(budgets))
            .build()
            .unwrap();

        let assessment = engine.assess("slow.example").await;
        assert_eq!(assessment.weighted_score(), 0.0);
        let tracking = &assessment.signals[0];
        assert!(tracking.is_failed());
        assert!(tracking.error.as_deref().unwrap_or_default().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_domain_is_degraded() {
        let engine = engine_with([
            signal(SourceId::Tracking, 70.0, true),
            signal(SourceId::PublicLibrary, 0.0, false),
            signal(SourceId::PageTransparency, 0.0, false),
        ]);
        let assessment = engine.assess("  https://www./ ").await;
        assert!(assessment.is_degraded());
        assert_eq!(assessment.weighted_score(), 0.0);
        assert_eq!(assessment.priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_cancelled_assess_is_degraded() {
        let engine = AssessmentEngine::builder()
            .detector(
                StaticDetector::new(signal(SourceId::Tracking, 90.0, true))
                    .with_delay(Duration::from_secs(60)),
            )
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let assessment = engine.assess_with_cancel("example.com", &cancel).await;
        assert!(assessment.is_degraded());
        assert_eq!(assessment.error.as_deref(), Some("operation cancelled"));
    }

    #[tokio::test]
    async fn test_timestamp_from_clock() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let engine = AssessmentEngine::builder()
            .detector(StaticDetector::new(signal(SourceId::Tracking, 10.0, false)))
            .clock(Arc::new(FixedClock::new(at)))
            .build()
            .unwrap();

        let assessment = engine.assess("example.com").await;
        assert_eq!(assessment.assessed_at, at);
    }
}
