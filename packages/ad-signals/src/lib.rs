//! Heuristic Ad-Activity Scoring Library
//!
//! Estimates whether a domain is running paid online advertising by
//! combining weak public signals, so that only promising domains are sent
//! on to expensive official ad APIs.
//!
//! # Design Philosophy
//!
//! **"Cheap signals first, paid lookups last"**
//!
//! - Every detector is independent and may fail without sinking the others
//! - Evidence travels with every score
//! - The decision is an OR over signals, not a single threshold
//! - Library handles mechanics, the host application handles I/O and output
//!
//! # Usage
//!
//! ```rust,ignore
//! use ad_signals::{AssessmentEngine, BatchScheduler, EngineConfig, HttpFetcher};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
//! let engine = Arc::new(AssessmentEngine::with_defaults(fetcher, config)?);
//!
//! // One domain
//! let assessment = engine.assess("https://www.example.com/").await;
//! println!("{} -> {}", assessment.domain, assessment.weighted_score());
//!
//! // Many domains, at most three at a time
//! let report = BatchScheduler::new(engine).evaluate_many(&["a.com", "b.com"], 3).await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Fetcher, Detector, Clock)
//! - [`types`] - Domain keys, signals, assessments, config
//! - [`fetchers`] - HTTP fetcher, browser header profiles, rate limiting
//! - [`matcher`] - Weighted pattern rules and HTML extraction
//! - [`detectors`] - Tracking, public-library and page-transparency detectors
//! - [`pipeline`] - Aggregation engine and batch scheduler
//! - [`testing`] - Mock implementations for testing

pub mod detectors;
pub mod error;
pub mod fetchers;
pub mod matcher;
pub mod pipeline;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{DetectorError, EngineError, FetchError, ParseError, Result};
pub use traits::{
    clock::{Clock, SystemClock},
    detector::Detector,
    fetcher::{FetchRequest, FetchResponse, Fetcher},
};
pub use types::{
    assessment::{CompositeScore, ConfidenceTier, DecisionRule, DomainAssessment, Priority},
    config::{
        BatchConfig, DetectorBudgets, EngineConfig, FetchConfig, PriorityBands, ScoringPolicy,
        SourceWeights, TierBands,
    },
    domain::DomainKey,
    report::{BatchReport, PaidApiSummary, PriorityHistogram},
    signal::{SignalResult, SourceId},
};

// Re-export fetchers
pub use fetchers::{apply_rate_limit, BrowserProfile, FetcherExt, HttpFetcher, RateLimitedFetcher};

// Re-export matcher
pub use matcher::{html::ParsedPage, MatchOutcome, Pattern, PatternMatcher, RuleGroup, RuleSet};

// Re-export detectors
pub use detectors::{
    LibraryHit, LibrarySurface, PageCheck, PageProbe, PageTransparencyChecker,
    PublicLibraryLookup, TrackingAnalyzer,
};

// Re-export pipeline components
pub use pipeline::{
    next_steps, recommendation, score_signals, AssessmentEngine, AssessmentEngineBuilder,
    BatchOptions, BatchScheduler,
};
