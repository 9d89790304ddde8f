//! Batch report built from a set of assessments.

use serde::{Deserialize, Serialize};

use crate::types::assessment::{DomainAssessment, Priority};

/// Count of assessments per priority tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityHistogram {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl PriorityHistogram {
    /// Tally priorities.
    pub fn from_priorities(priorities: impl IntoIterator<Item = Priority>) -> Self {
        let mut histogram = Self::default();
        for priority in priorities {
            match priority {
                Priority::Critical => histogram.critical += 1,
                Priority::High => histogram.high += 1,
                Priority::Medium => histogram.medium += 1,
                Priority::Low => histogram.low += 1,
            }
        }
        histogram
    }

    /// Count for one tier.
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// How much of a batch still needs a paid API lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaidApiSummary {
    /// Composite score at or above which a domain is a candidate
    pub threshold: f64,
    pub candidates: usize,
    /// Share of domains that can skip the paid lookup (0-100)
    pub estimated_savings_pct: f64,
}

/// Ranked results of a batch run.
///
/// Every field is derived from `results`; there is no independent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Assessments, highest weighted score first
    pub results: Vec<DomainAssessment>,

    pub priority_histogram: PriorityHistogram,

    /// Mean weighted score (0 for an empty batch)
    pub average_score: f64,

    pub count: usize,
}

impl BatchReport {
    /// Build the report from already ordered and filtered results.
    pub fn from_results(results: Vec<DomainAssessment>) -> Self {
        let count = results.len();
        let priority_histogram =
            PriorityHistogram::from_priorities(results.iter().map(|r| r.priority));
        let average_score = if count == 0 {
            0.0
        } else {
            results.iter().map(|r| r.weighted_score()).sum::<f64>() / count as f64
        };

        Self {
            results,
            priority_histogram,
            average_score,
            count,
        }
    }

    /// Number of assessments at or above a paid-API threshold.
    pub fn paid_api_candidates(&self, threshold: f64) -> usize {
        self.results
            .iter()
            .filter(|r| r.weighted_score() >= threshold)
            .count()
    }

    /// Percentage of domains that can skip a paid API lookup.
    pub fn estimated_savings_pct(&self, threshold: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let skipped = self.count - self.paid_api_candidates(threshold);
        skipped as f64 / self.count as f64 * 100.0
    }

    /// Candidates and savings for a paid-API threshold.
    pub fn paid_api_summary(&self, threshold: f64) -> PaidApiSummary {
        PaidApiSummary {
            threshold,
            candidates: self.paid_api_candidates(threshold),
            estimated_savings_pct: self.estimated_savings_pct(threshold),
        }
    }

    /// Assessments whose evaluation failed.
    pub fn degraded(&self) -> impl Iterator<Item = &DomainAssessment> {
        self.results.iter().filter(|r| r.is_degraded())
    }
}
