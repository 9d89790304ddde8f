//! Configuration types for scoring, fetching and batching.
//!
//! The scoring constants were tuned empirically against real domains. They
//! are kept here as data rather than scattered literals so hosts can adjust
//! them (for example from a JSON policy file).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::types::signal::SourceId;

/// Fixed weight per source. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    pub tracking: f64,
    pub public_library: f64,
    pub page_transparency: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            tracking: 0.5,
            public_library: 0.3,
            page_transparency: 0.2,
        }
    }
}

impl SourceWeights {
    /// Weight for a source.
    pub fn weight(&self, source: SourceId) -> f64 {
        match source {
            SourceId::Tracking => self.tracking,
            SourceId::PublicLibrary => self.public_library,
            SourceId::PageTransparency => self.page_transparency,
        }
    }

    fn total(&self) -> f64 {
        self.tracking + self.public_library + self.page_transparency
    }
}

/// Lower bounds of each confidence tier (score >= bound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBands {
    pub very_high: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            very_high: 80.0,
            high: 60.0,
            medium: 40.0,
            low: 20.0,
        }
    }
}

/// Lower bounds of each priority tier (score >= bound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityBands {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityBands {
    fn default() -> Self {
        Self {
            critical: 80.0,
            high: 60.0,
            medium: 35.0,
        }
    }
}

/// Every tunable constant of the scoring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Weight table for the composite score.
    pub weights: SourceWeights,

    /// Composite score at or above which the decision is positive.
    ///
    /// Default: 15.
    pub decision_threshold: f64,

    /// Tracking raw score strictly above which the decision is positive.
    ///
    /// Default: 60.
    pub strong_tracking_threshold: f64,

    /// Confidence tier bands.
    pub tier_bands: TierBands,

    /// Priority bands.
    pub priority_bands: PriorityBands,

    /// Tracking score strictly above which the analyzer reports a signal.
    ///
    /// Default: 20.
    pub tracking_signal_threshold: f64,

    /// Minimum identity sub-confidence for a transparency page to be
    /// accepted. Default: 25.
    pub identity_threshold: u32,

    /// Transparency confidence at which variant search stops. Default: 80.
    pub early_stop_confidence: u32,

    /// Composite score at or above which a domain is worth a paid API
    /// lookup. Default: 50.
    pub paid_api_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: SourceWeights::default(),
            decision_threshold: 15.0,
            strong_tracking_threshold: 60.0,
            tier_bands: TierBands::default(),
            priority_bands: PriorityBands::default(),
            tracking_signal_threshold: 20.0,
            identity_threshold: 25,
            early_stop_confidence: 80,
            paid_api_threshold: 50.0,
        }
    }
}

impl ScoringPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the weight table.
    pub fn with_weights(mut self, weights: SourceWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the composite decision threshold.
    pub fn with_decision_threshold(mut self, threshold: f64) -> Self {
        self.decision_threshold = threshold;
        self
    }

    /// Set the strong-tracking override threshold.
    pub fn with_strong_tracking_threshold(mut self, threshold: f64) -> Self {
        self.strong_tracking_threshold = threshold;
        self
    }

    /// Check weights and bands for consistency.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        if [w.tracking, w.public_library, w.page_transparency]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(EngineError::InvalidPolicy {
                reason: "weights must be finite and non-negative".to_string(),
            });
        }
        if (w.total() - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidPolicy {
                reason: format!("weights sum to {}, expected 1.0", w.total()),
            });
        }

        let t = &self.tier_bands;
        if !(t.very_high >= t.high && t.high >= t.medium && t.medium >= t.low) {
            return Err(EngineError::InvalidPolicy {
                reason: "tier bands must be descending".to_string(),
            });
        }

        let p = &self.priority_bands;
        if !(p.critical >= p.high && p.high >= p.medium) {
            return Err(EngineError::InvalidPolicy {
                reason: "priority bands must be descending".to_string(),
            });
        }

        Ok(())
    }
}

/// Settings for outbound fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds. Default: 15.
    pub request_timeout_secs: u64,

    /// Maximum redirects followed. Default: 5.
    pub max_redirects: usize,

    /// Sustained request rate across all detectors (0 = unlimited).
    pub requests_per_second: u32,

    /// Burst allowance on top of the sustained rate.
    pub burst: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            max_redirects: 5,
            requests_per_second: 0,
            burst: 1,
        }
    }
}

impl FetchConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Set per-request timeout.
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Set the request rate limit.
    pub fn with_rate_limit(mut self, requests_per_second: u32, burst: u32) -> Self {
        self.requests_per_second = requests_per_second;
        self.burst = burst;
        self
    }
}

/// Wall-clock budget per detector, enforced by the engine.
///
/// The tracking budget covers its three sequential homepage attempts at
/// the default request timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorBudgets {
    pub tracking_secs: u64,
    pub public_library_secs: u64,
    pub page_transparency_secs: u64,
}

impl Default for DetectorBudgets {
    fn default() -> Self {
        Self {
            tracking_secs: 45,
            public_library_secs: 30,
            page_transparency_secs: 120,
        }
    }
}

impl DetectorBudgets {
    /// Budget for a source.
    pub fn budget(&self, source: SourceId) -> Duration {
        Duration::from_secs(match source {
            SourceId::Tracking => self.tracking_secs,
            SourceId::PublicLibrary => self.public_library_secs,
            SourceId::PageTransparency => self.page_transparency_secs,
        })
    }
}

/// Batch scheduling limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrency used when the caller does not ask for one. Default: 3.
    pub default_concurrency: usize,

    /// Ceiling applied to every request regardless of what the caller
    /// asks. Default: 5.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 3,
            max_concurrency: 5,
        }
    }
}

impl BatchConfig {
    /// Concurrency actually used for a requested value.
    pub fn effective_concurrency(&self, requested: Option<usize>) -> usize {
        let ceiling = self.max_concurrency.max(1);
        requested
            .unwrap_or(self.default_concurrency)
            .clamp(1, ceiling)
    }
}

/// Top-level configuration bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: ScoringPolicy,
    pub fetch: FetchConfig,
    pub budgets: DetectorBudgets,
    pub batch: BatchConfig,
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scoring policy.
    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set fetch settings.
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Set detector budgets.
    pub fn with_budgets(mut self, budgets: DetectorBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Set batch limits.
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }
}
