//! Batch scheduler: assess many domains under a concurrency cap.
//!
//! Inputs are normalized and de-duplicated (first occurrence keeps its
//! position), then dispatched through a semaphore. A domain is only
//! dequeued once a permit is free, so at most `max_concurrency` domain
//! evaluations are ever in flight.
//!
//! Results are ordered by weighted score, highest first, with input order
//! as the tie-break, so the ordering is deterministic whenever the detector
//! outputs are.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::pipeline::engine::AssessmentEngine;
use crate::types::assessment::DomainAssessment;
use crate::types::domain::DomainKey;
use crate::types::report::BatchReport;

/// Per-run batch options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    /// Requested concurrency; clamped to the engine's ceiling
    pub max_concurrency: Option<usize>,

    /// Drop results scoring below this
    pub min_score: Option<f64>,

    /// Keep only the first N results after sorting
    pub top_n: Option<usize>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }
}

enum Entry {
    Valid(DomainKey),
    Empty(String),
}

/// Runs an [`AssessmentEngine`] over many domains.
#[derive(Clone)]
pub struct BatchScheduler {
    engine: Arc<AssessmentEngine>,
}

impl BatchScheduler {
    pub fn new(engine: Arc<AssessmentEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &AssessmentEngine {
        &self.engine
    }

    /// Assess every domain with the given concurrency and no filters.
    pub async fn evaluate_many<S: AsRef<str>>(&self, domains: &[S], max_concurrency: usize) -> BatchReport {
        let options = BatchOptions::new().with_max_concurrency(max_concurrency);
        self.assess_batch(domains, &options, &CancellationToken::new())
            .await
    }

    /// Assess every domain, then sort, filter and summarize.
    ///
    /// When `cancel` fires no further domains are dequeued and in-flight
    /// evaluations are abandoned. Domains that had already finished are
    /// still returned.
    pub async fn assess_batch<S: AsRef<str>>(
        &self,
        domains: &[S],
        options: &BatchOptions,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let started = Instant::now();
        let entries = dedup(domains);
        let concurrency = self
            .engine
            .config()
            .batch
            .effective_concurrency(options.max_concurrency);

        info!(
            requested = domains.len(),
            distinct = entries.len(),
            concurrency,
            "batch starting"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<Result<DomainAssessment, EngineError>> = JoinSet::new();
        let mut spawned: HashMap<Id, (usize, DomainKey)> = HashMap::new();
        let mut results: Vec<(usize, DomainAssessment)> = Vec::with_capacity(entries.len());

        for (index, entry) in entries.into_iter().enumerate() {
            let key = match entry {
                Entry::Valid(key) => key,
                Entry::Empty(raw) => {
                    let error = EngineError::EmptyDomain { input: raw.clone() };
                    results.push((index, self.engine.degraded(&raw, &error)));
                    continue;
                }
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(remaining_from = index, "batch cancelled, no further domains dequeued");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let engine = self.engine.clone();
            let cancel = cancel.clone();
            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                engine.assess_key(&task_key, &cancel).await
            });
            spawned.insert(handle.id(), (index, key));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    let reason = if e.is_panic() { "panicked" } else { "was aborted" };
                    (e.id(), Err(EngineError::Evaluation(format!("evaluation task {}", reason))))
                }
            };
            let Some((index, key)) = spawned.remove(&id) else {
                warn!(task = %id, "result from unknown batch task");
                continue;
            };

            match outcome {
                Ok(assessment) => results.push((index, assessment)),
                Err(EngineError::Cancelled) => {
                    debug!(domain = %key, "in-flight assessment abandoned");
                }
                Err(e) => {
                    warn!(domain = %key, error = %e, "domain evaluation failed");
                    results.push((index, self.engine.degraded(key.as_str(), &e)));
                }
            }
        }

        let report = finish(results, options);
        info!(
            count = report.count,
            average_score = report.average_score,
            critical = report.priority_histogram.critical,
            high = report.priority_histogram.high,
            elapsed_ms = started.elapsed().as_millis() as u64,
            cancelled = cancel.is_cancelled(),
            "batch complete"
        );
        report
    }
}

/// Normalize inputs and keep the first occurrence of each domain.
fn dedup<S: AsRef<str>>(domains: &[S]) -> Vec<Entry> {
    let mut seen: HashSet<DomainKey> = HashSet::new();
    let mut entries = Vec::with_capacity(domains.len());
    for raw in domains {
        let raw = raw.as_ref();
        match DomainKey::parse(raw) {
            Some(key) => {
                if seen.insert(key.clone()) {
                    entries.push(Entry::Valid(key));
                }
            }
            None => entries.push(Entry::Empty(raw.to_string())),
        }
    }
    entries
}

/// Sort (score descending, input order on ties), filter, and summarize.
fn finish(mut results: Vec<(usize, DomainAssessment)>, options: &BatchOptions) -> BatchReport {
    results.sort_by(|(ia, a), (ib, b)| {
        b.weighted_score()
            .total_cmp(&a.weighted_score())
            .then_with(|| ia.cmp(ib))
    });

    let mut ordered: Vec<DomainAssessment> = results.into_iter().map(|(_, a)| a).collect();
    if let Some(min_score) = options.min_score {
        ordered.retain(|a| a.weighted_score() >= min_score);
    }
    if let Some(top_n) = options.top_n {
        ordered.truncate(top_n);
    }
    BatchReport::from_results(ordered)
}
