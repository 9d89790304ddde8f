//! Per-detector signal results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a signal source and its slot in the weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// On-site tracking artifacts
    Tracking,
    /// Public ad-library presence
    PublicLibrary,
    /// Social page "ads are running" disclosures
    PageTransparency,
}

impl SourceId {
    /// All sources in weight-table order. Ties for strongest source go to the
    /// earlier entry.
    pub const ALL: [SourceId; 3] = [
        SourceId::Tracking,
        SourceId::PublicLibrary,
        SourceId::PageTransparency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Tracking => "tracking",
            SourceId::PublicLibrary => "public_library",
            SourceId::PageTransparency => "page_transparency",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one detector for one domain.
///
/// Built once per detector invocation and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    /// Which detector produced this
    pub source_id: SourceId,

    /// Detector score (0-100)
    pub raw_score: f64,

    /// Detector's confidence in its own score (0-100)
    pub confidence: u8,

    /// What fired, in the order it was found
    pub evidence: Vec<String>,

    /// Whether the detector considers its signal present
    pub has_signal: bool,

    /// Failure annotation; set results always carry score 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignalResult {
    /// A result with nothing found.
    pub fn empty(source_id: SourceId) -> Self {
        Self {
            source_id,
            raw_score: 0.0,
            confidence: 0,
            evidence: Vec::new(),
            has_signal: false,
            error: None,
        }
    }

    /// A failed invocation: zero score, no signal, error recorded.
    pub fn failed(source_id: SourceId, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(source_id)
        }
    }

    /// Set the raw score, clamped to 0-100.
    pub fn with_score(mut self, score: f64) -> Self {
        self.raw_score = clamp_score(score);
        self
    }

    /// Set the confidence, clamped to 0-100.
    pub fn with_confidence(mut self, confidence: u32) -> Self {
        self.confidence = confidence.min(100) as u8;
        self
    }

    /// Set the signal flag.
    pub fn with_signal(mut self, has_signal: bool) -> Self {
        self.has_signal = has_signal;
        self
    }

    /// Append evidence lines.
    pub fn with_evidence(mut self, evidence: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.evidence.extend(evidence.into_iter().map(Into::into));
        self
    }

    /// Whether this invocation failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Score this source contributes to the composite. Failed results
    /// contribute 0. Tracking contributes its raw score even below its
    /// signal threshold; the lookup sources only count when they signal.
    pub fn contribution(&self) -> f64 {
        if self.is_failed() {
            return 0.0;
        }
        match self.source_id {
            SourceId::Tracking => clamp_score(self.raw_score),
            SourceId::PublicLibrary | SourceId::PageTransparency if self.has_signal => {
                clamp_score(self.raw_score)
            }
            _ => 0.0,
        }
    }
}

pub(crate) fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}
