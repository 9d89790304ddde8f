//! Composite scores and per-domain assessments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::config::{PriorityBands, TierBands};
use crate::types::signal::{SignalResult, SourceId};

/// Confidence tier derived from the weighted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceTier {
    /// Map a weighted score onto the tier bands.
    pub fn from_score(score: f64, bands: &TierBands) -> Self {
        if score >= bands.very_high {
            ConfidenceTier::VeryHigh
        } else if score >= bands.high {
            ConfidenceTier::High
        } else if score >= bands.medium {
            ConfidenceTier::Medium
        } else if score >= bands.low {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }
}

/// Follow-up priority used for batch ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Map a weighted score onto the priority bands.
    pub fn from_score(score: f64, bands: &PriorityBands) -> Self {
        if score >= bands.critical {
            Priority::Critical
        } else if score >= bands.high {
            Priority::High
        } else if score >= bands.medium {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Whether this tier justifies an exact-count lookup with a paid API.
    pub fn warrants_paid_verification(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        f.write_str(label)
    }
}

/// One clause of the OR decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    /// Public ad library signalled
    LibrarySignal,
    /// Secondary library-style source (page transparency) signalled
    SecondarySignal,
    /// Weighted score reached the decision threshold
    CompositeThreshold,
    /// Tracking score alone exceeded the override threshold
    StrongTracking,
}

/// Weighted combination of all signals for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    /// Contribution per source (0 for failed sources and silent lookups)
    pub per_source_scores: BTreeMap<SourceId, f64>,

    /// Weighted sum of contributions (0-100)
    pub weighted_score: f64,

    /// Number of sources reporting a signal
    pub methods_detected: usize,

    /// Source with the highest contribution
    pub strongest_source: SourceId,

    /// "Likely running ads"
    pub decision: bool,

    /// Which OR clauses fired
    pub triggered_rules: Vec<DecisionRule>,

    /// Tier derived from the weighted score
    pub confidence_tier: ConfidenceTier,
}

/// Final result for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAssessment {
    /// Normalized domain (raw input if it normalized to nothing)
    pub domain: String,

    pub composite: CompositeScore,

    pub priority: Priority,

    pub recommendation: String,

    pub next_steps: Vec<String>,

    /// Detector outputs the composite was computed from
    pub signals: Vec<SignalResult>,

    pub assessed_at: DateTime<Utc>,

    /// Set when the whole evaluation failed and the score was forced to 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainAssessment {
    /// Shorthand for `composite.weighted_score`.
    pub fn weighted_score(&self) -> f64 {
        self.composite.weighted_score
    }

    /// Whether the evaluation was degraded by a failure.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}
