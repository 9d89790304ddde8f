//! Core trait abstractions for the ad-signals library.
//!
//! These traits define the capabilities the engine consumes: outbound
//! fetching, per-source detection and a wall-clock source.

pub mod clock;
pub mod detector;
pub mod fetcher;
