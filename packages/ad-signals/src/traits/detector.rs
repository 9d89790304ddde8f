//! Detector trait: one weak signal about ad activity.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DetectorResult;
use crate::types::{domain::DomainKey, signal::{SignalResult, SourceId}};

/// A single independent signal source.
///
/// Implementations convert their own fetch and parse failures into a
/// [`SignalResult`] (zero score, `error` set where appropriate). An `Err`
/// or a panic is still tolerated: the engine records it as a failed signal
/// and keeps scoring the other sources.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Weight slot this detector fills.
    fn source(&self) -> SourceId;

    /// Inspect one domain. Outbound HTTP is the only side effect.
    async fn evaluate(
        &self,
        domain: &DomainKey,
        cancel: &CancellationToken,
    ) -> DetectorResult<SignalResult>;
}
