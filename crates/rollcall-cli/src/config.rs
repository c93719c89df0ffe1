use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rollcall_core::{MatchAlgorithm, MatchConfig, TierThresholds, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};

/// CLI configuration, loaded from an optional TOML file and `ROLLCALL_*`
/// environment variables (environment wins).
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Threshold applied when a request does not carry its own.
    pub default_threshold: f32,
    /// Algorithm applied when a request does not name one.
    pub default_algorithm: MatchAlgorithm,
    /// Tier cut points and scorer fan-out passed into every call.
    pub matching: MatchConfig,
    /// Requests reconciled at once by `batch`.
    pub batch_concurrency: usize,
    /// Upper bound on validation + scoring per request, in milliseconds.
    pub score_timeout_ms: u64,
    /// File the settings were read from, if any.
    pub source: Option<PathBuf>,
}

/// On-disk form. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    threshold: Option<f32>,
    algorithm: Option<MatchAlgorithm>,
    tiers: Option<TierThresholds>,
    scorer_workers: Option<usize>,
    batch_concurrency: Option<usize>,
    score_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
            default_algorithm: MatchAlgorithm::default(),
            matching: MatchConfig::default(),
            batch_concurrency: 4,
            score_timeout_ms: 5_000,
            source: None,
        }
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (if set) and then `ROLLCALL_*` overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        config.default_threshold = env_f32("ROLLCALL_THRESHOLD", config.default_threshold);
        config.matching.scorer_workers =
            env_usize("ROLLCALL_SCORER_WORKERS", config.matching.scorer_workers);
        config.batch_concurrency = env_usize("ROLLCALL_BATCH_CONCURRENCY", config.batch_concurrency);
        config.score_timeout_ms = env_u64("ROLLCALL_SCORE_TIMEOUT_MS", config.score_timeout_ms);

        if let Ok(name) = std::env::var("ROLLCALL_ALGORITHM") {
            config.default_algorithm = name
                .parse()
                .map_err(anyhow::Error::msg)
                .context("ROLLCALL_ALGORITHM")?;
        }

        let tiers = config.matching.tiers;
        config.matching.tiers = TierThresholds::new(
            env_f32("ROLLCALL_TIER_HIGH", tiers.high()),
            env_f32("ROLLCALL_TIER_MEDIUM", tiers.medium()),
            env_f32("ROLLCALL_TIER_LOW", tiers.low()),
        )
        .context("tier cut points from environment")?;

        rollcall_core::request::validate_threshold(config.default_threshold)
            .context("default threshold")?;
        config.batch_concurrency = config.batch_concurrency.max(1);

        Ok(config)
    }

    /// Load a TOML config file over the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: FileConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        let defaults = Self::default();
        Ok(Self {
            default_threshold: file.threshold.unwrap_or(defaults.default_threshold),
            default_algorithm: file.algorithm.unwrap_or(defaults.default_algorithm),
            matching: MatchConfig {
                tiers: file.tiers.unwrap_or(defaults.matching.tiers),
                scorer_workers: file
                    .scorer_workers
                    .unwrap_or(defaults.matching.scorer_workers),
            },
            batch_concurrency: file.batch_concurrency.unwrap_or(defaults.batch_concurrency),
            score_timeout_ms: file.score_timeout_ms.unwrap_or(defaults.score_timeout_ms),
            source: Some(path.to_path_buf()),
        })
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("rollcall-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.default_threshold, 0.6);
        assert_eq!(c.default_algorithm, MatchAlgorithm::GreedyV1);
        assert_eq!(c.matching.tiers.high(), 0.85);
        assert_eq!(c.matching.scorer_workers, 1);
    }

    #[test]
    fn test_from_file_partial() {
        let path = write_temp(
            "partial.toml",
            r#"
threshold = 0.7
algorithm = "optimal-v1"
scorer_workers = 4

[tiers]
high = 0.9
medium = 0.8
low = 0.7
"#,
        );
        let c = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(c.default_threshold, 0.7);
        assert_eq!(c.default_algorithm, MatchAlgorithm::OptimalV1);
        assert_eq!(c.matching.scorer_workers, 4);
        assert_eq!(c.matching.tiers.low(), 0.7);
        assert_eq!(c.batch_concurrency, 4);
    }

    #[test]
    fn test_from_file_rejects_unordered_tiers() {
        let path = write_temp(
            "unordered.toml",
            "[tiers]\nhigh = 0.5\nmedium = 0.8\nlow = 0.7\n",
        );
        let result = Config::from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_rejects_unknown_key() {
        let path = write_temp("unknown.toml", "top_k = 3\n");
        let result = Config::from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
