use std::env;

use serde::{Deserialize, Serialize};

/// Load a .env file if one exists; a missing file is not an error.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// All tunables for one engine instance. Built once by the host (no global
/// lookup anywhere below this point) and handed to `Engine` by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scorer: ScorerConfig,
    pub calibrator: CalibratorConfig,
    pub consensus: ConsensusConfig,
    pub retrain: RetrainConfig,
}

impl EngineConfig {
    /// Read every section from `VERDICT_*` environment variables; call
    /// [`load_dotenv`] beforehand if a .env file should be honored.
    /// Every key falls back to its built-in default when unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            scorer: ScorerConfig::from_env(),
            calibrator: CalibratorConfig::from_env(),
            consensus: ConsensusConfig::from_env(),
            retrain: RetrainConfig::from_env(),
        }
    }

    /// Print an effective-config summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded:");
        tracing::info!(
            "  scorer:     split_seed={}, default_threshold={}",
            self.scorer.split_seed,
            self.scorer.default_threshold
        );
        tracing::info!(
            "  drift:      mean>{}, std>{}, min_batch={}",
            self.scorer.drift.mean_threshold,
            self.scorer.drift.std_threshold,
            self.scorer.drift.min_batch_size
        );
        tracing::info!(
            "  calibrator: min_samples={}, resamples={}, seed={}",
            self.calibrator.min_samples,
            self.calibrator.bootstrap_resamples,
            self.calibrator.bootstrap_seed
        );
        tracing::info!(
            "  consensus:  quorum={}, validator_timeout={}s",
            self.consensus.quorum_threshold,
            self.consensus.validator_timeout_secs
        );
        tracing::info!("  retrain:    interval={}s", self.retrain.interval_secs);
    }

    /// Summary view safe to expose to hosts (all values are tunables, no secrets).
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "scorer": {
                "split_seed": self.scorer.split_seed,
                "default_threshold": self.scorer.default_threshold,
            },
            "drift": {
                "mean_threshold": self.scorer.drift.mean_threshold,
                "std_threshold": self.scorer.drift.std_threshold,
                "min_batch_size": self.scorer.drift.min_batch_size,
            },
            "calibrator": {
                "min_samples": self.calibrator.min_samples,
                "bootstrap_resamples": self.calibrator.bootstrap_resamples,
                "bootstrap_seed": self.calibrator.bootstrap_seed,
            },
            "consensus": {
                "quorum_threshold": self.consensus.quorum_threshold,
                "validator_timeout_secs": self.consensus.validator_timeout_secs,
            },
            "retrain": { "interval_secs": self.retrain.interval_secs },
        })
    }
}

// ── Ensemble scorer ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Seed for the stratified train/test shuffle.
    pub split_seed: u64,
    /// Decision threshold until a calibration overrides it.
    pub default_threshold: f64,
    pub drift: DriftConfig,
}

impl ScorerConfig {
    fn from_env() -> Self {
        Self {
            split_seed: env_u64("VERDICT_SPLIT_SEED", 42),
            default_threshold: env_f64("VERDICT_DEFAULT_THRESHOLD", 0.5),
            drift: DriftConfig::from_env(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            split_seed: 42,
            default_threshold: 0.5,
            drift: DriftConfig::default(),
        }
    }
}

/// Drift is flagged when either distance exceeds its threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// L2 distance between per-feature mean vectors.
    pub mean_threshold: f64,
    /// L2 distance between per-feature standard-deviation vectors.
    pub std_threshold: f64,
    /// Batches smaller than this are rejected as insufficient data.
    pub min_batch_size: usize,
}

impl DriftConfig {
    fn from_env() -> Self {
        Self {
            mean_threshold: env_f64("VERDICT_DRIFT_MEAN_THRESHOLD", 0.5),
            std_threshold: env_f64("VERDICT_DRIFT_STD_THRESHOLD", 0.3),
            min_batch_size: env_usize("VERDICT_DRIFT_MIN_BATCH", 10),
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            mean_threshold: 0.5,
            std_threshold: 0.3,
            min_batch_size: 10,
        }
    }
}

// ── Threshold calibrator ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratorConfig {
    /// Labeled points required per detector before calibration is attempted.
    pub min_samples: usize,
    /// Bootstrap resample count for the 95% confidence interval.
    pub bootstrap_resamples: usize,
    /// Seed for bootstrap resampling; fixed for reproducible intervals.
    pub bootstrap_seed: u64,
}

impl CalibratorConfig {
    fn from_env() -> Self {
        Self {
            min_samples: env_usize("VERDICT_CALIBRATION_MIN_SAMPLES", 10),
            bootstrap_resamples: env_usize("VERDICT_BOOTSTRAP_RESAMPLES", 1000),
            bootstrap_seed: env_u64("VERDICT_BOOTSTRAP_SEED", 42),
        }
    }
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            bootstrap_resamples: 1000,
            bootstrap_seed: 42,
        }
    }
}

// ── Consensus aggregator ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Agreement ratio below which a result is marked as requiring review.
    pub quorum_threshold: f64,
    /// Per-validator call budget.
    pub validator_timeout_secs: u64,
}

impl ConsensusConfig {
    fn from_env() -> Self {
        Self {
            quorum_threshold: env_f64("VERDICT_QUORUM_THRESHOLD", 0.7),
            validator_timeout_secs: env_u64("VERDICT_VALIDATOR_TIMEOUT_SECS", 30),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            quorum_threshold: 0.7,
            validator_timeout_secs: 30,
        }
    }
}

// ── Retrain monitor ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainConfig {
    /// How often the monitor thread drains submitted batches.
    pub interval_secs: u64,
}

impl RetrainConfig {
    fn from_env() -> Self {
        Self {
            interval_secs: env_u64("VERDICT_RETRAIN_INTERVAL_SECS", 300),
        }
    }
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.scorer.split_seed, 42);
        assert_eq!(cfg.scorer.default_threshold, 0.5);
        assert_eq!(cfg.scorer.drift.mean_threshold, 0.5);
        assert_eq!(cfg.scorer.drift.std_threshold, 0.3);
        assert_eq!(cfg.scorer.drift.min_batch_size, 10);
        assert_eq!(cfg.calibrator.min_samples, 10);
        assert_eq!(cfg.calibrator.bootstrap_resamples, 1000);
        assert_eq!(cfg.consensus.quorum_threshold, 0.7);
        assert_eq!(cfg.consensus.validator_timeout_secs, 30);
    }

    #[test]
    fn summary_exposes_every_section() {
        let summary = EngineConfig::default().summary();
        for key in ["scorer", "drift", "calibrator", "consensus", "retrain"] {
            assert!(summary.get(key).is_some(), "missing section {}", key);
        }
    }
}
