//! Scoring pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Concurrent detector runs per domain with failure isolation
//! - Weighted composite scoring and the OR decision policy
//! - Priority tiers and follow-up advice
//! - Bounded-concurrency batch runs with cancellation

pub mod advice;
pub mod batch;
pub mod engine;

pub use advice::{next_steps, recommendation};
pub use batch::{BatchOptions, BatchScheduler};
pub use engine::{score_signals, AssessmentEngine, AssessmentEngineBuilder};
