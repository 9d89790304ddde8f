use ad_signals::{EngineConfig, ScoringPolicy};
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::{Path, PathBuf};

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub max_concurrency: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub transparency_budget_secs: Option<u64>,
    pub requests_per_second: Option<u32>,
    pub policy_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            max_concurrency: parse_var("ADSCOUT_MAX_CONCURRENCY")?,
            fetch_timeout_secs: parse_var("ADSCOUT_FETCH_TIMEOUT_SECS")?,
            transparency_budget_secs: parse_var("ADSCOUT_TRANSPARENCY_BUDGET_SECS")?,
            requests_per_second: parse_var("ADSCOUT_REQUESTS_PER_SECOND")?,
            policy_file: env::var("ADSCOUT_POLICY_FILE").ok().map(PathBuf::from),
        })
    }

    /// Build the engine configuration, reading the policy file if one is set.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();

        if let Some(path) = &self.policy_file {
            config.policy = load_policy(path)?;
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config.fetch = config.fetch.with_request_timeout_secs(secs);
        }
        if let Some(secs) = self.transparency_budget_secs {
            config.budgets.page_transparency_secs = secs;
        }
        if let Some(rps) = self.requests_per_second {
            config.fetch = config.fetch.with_rate_limit(rps, rps.max(1));
        }
        if let Some(max) = self.max_concurrency {
            config.batch.default_concurrency = max;
        }

        config
            .policy
            .validate()
            .context("Scoring policy is invalid")?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(None),
    }
}

/// Read a JSON scoring policy. Missing fields keep their defaults.
pub fn load_policy(path: &Path) -> Result<ScoringPolicy> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse policy file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_engine_config_applies_overrides() {
        let config = Config {
            max_concurrency: Some(4),
            fetch_timeout_secs: Some(10),
            transparency_budget_secs: Some(60),
            requests_per_second: Some(2),
            policy_file: None,
        };
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.batch.default_concurrency, 4);
        assert_eq!(engine.fetch.request_timeout_secs, 10);
        assert_eq!(engine.budgets.page_transparency_secs, 60);
        assert_eq!(engine.fetch.requests_per_second, 2);
    }

    #[test]
    fn test_policy_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"decision_threshold": 20.0}}"#).unwrap();

        let policy = load_policy(file.path()).unwrap();
        assert_eq!(policy.decision_threshold, 20.0);
        assert_eq!(policy.strong_tracking_threshold, 60.0);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"weights": {{"tracking": 0.9, "public_library": 0.3, "page_transparency": 0.2}}}}"#
        )
        .unwrap();

        let config = Config {
            policy_file: Some(file.path().to_path_buf()),
            ..Config::default()
        };
        assert!(config.engine_config().is_err());
    }
}
