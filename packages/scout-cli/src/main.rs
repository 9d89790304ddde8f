//! Command-line host for the ad-activity scoring engine.
//!
//! Prints assessments and batch reports as JSON on stdout; logs go to
//! stderr.

mod config;

use ad_signals::{
    apply_rate_limit, AssessmentEngine, BatchOptions, BatchReport, BatchScheduler, Fetcher,
    HttpFetcher, PaidApiSummary,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "adscout")]
#[command(about = "Estimate whether domains are running paid ads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a single domain
    Assess { domain: String },

    /// Assess many domains and rank them
    Batch {
        /// Domains to assess
        domains: Vec<String>,

        /// File with one domain per line (# starts a comment)
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Drop results scoring below this
        #[arg(long)]
        min_score: Option<f64>,

        /// Keep only the best N results
        #[arg(long)]
        top_n: Option<usize>,
    },
}

/// Batch output: the ranked report plus what it saves on paid lookups.
#[derive(Serialize)]
struct BatchOutput {
    #[serde(flatten)]
    report: BatchReport,
    paid_api: PaidApiSummary,
}

impl BatchOutput {
    fn new(report: BatchReport, paid_api_threshold: f64) -> Self {
        let paid_api = report.paid_api_summary(paid_api_threshold);
        Self { report, paid_api }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ad_signals=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let engine_config = config.engine_config()?;
    tracing::info!("Configuration loaded");

    // One client per run
    let http = HttpFetcher::new(&engine_config.fetch).context("Failed to build HTTP client")?;
    let fetcher: Arc<dyn Fetcher> = apply_rate_limit(Arc::new(http), &engine_config.fetch);
    let engine = Arc::new(
        AssessmentEngine::with_defaults(fetcher, engine_config)
            .context("Failed to build assessment engine")?,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Assess { domain } => {
            let assessment = engine.assess_with_cancel(&domain, &cancel).await;
            output(&assessment)
        }
        Commands::Batch {
            domains,
            file,
            max_concurrency,
            min_score,
            top_n,
        } => {
            let mut all = domains;
            if let Some(path) = file {
                all.extend(read_domains(&path)?);
            }
            if all.is_empty() {
                anyhow::bail!("No domains given");
            }

            let options = BatchOptions {
                max_concurrency,
                min_score,
                top_n,
            };
            let threshold = engine.config().policy.paid_api_threshold;
            let report = BatchScheduler::new(engine)
                .assess_batch(&all, &options, &cancel)
                .await;

            let degraded = report.degraded().count();
            if degraded > 0 {
                tracing::warn!(degraded, "Some domains could not be assessed");
            }
            let batch = BatchOutput::new(report, threshold);
            tracing::info!(
                candidates = batch.paid_api.candidates,
                savings_pct = batch.paid_api.estimated_savings_pct,
                "Paid API estimate"
            );
            output(&batch)
        }
    }
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn read_domains(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read domain file {}", path.display()))?;
    Ok(parse_domain_lines(&raw))
}

fn parse_domain_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_domain_lines_skips_comments_and_blanks() {
        let raw = "# competitors\nnike.com\n\n  adidas.com  \n#puma.com\n";
        assert_eq!(parse_domain_lines(raw), vec!["nike.com", "adidas.com"]);
    }

    #[test]
    fn test_batch_output_carries_paid_api_estimate() {
        let batch = BatchOutput::new(BatchReport::from_results(vec![]), 50.0);
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["count"], 0);
        assert_eq!(json["paid_api"]["threshold"], 50.0);
        assert_eq!(json["paid_api"]["candidates"], 0);
        assert!(json.get("results").is_some());
    }

    #[test]
    fn test_cli_parses_batch_flags() {
        let cli = Cli::try_parse_from([
            "adscout",
            "batch",
            "a.com",
            "b.com",
            "--max-concurrency",
            "2",
            "--top-n",
            "1",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch {
                domains,
                max_concurrency,
                top_n,
                min_score,
                file,
            } => {
                assert_eq!(domains, vec!["a.com", "b.com"]);
                assert_eq!(max_concurrency, Some(2));
                assert_eq!(top_n, Some(1));
                assert!(min_score.is_none());
                assert!(file.is_none());
            }
            Commands::Assess { .. } => panic!("expected batch"),
        }
    }
}
