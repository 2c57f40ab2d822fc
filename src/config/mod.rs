//! Runtime configuration (§6's configuration table), loaded by layering
//! an optional `AgentScan.toml`/`AgentScan.yaml` file under environment
//! variables prefixed `AGENTSCAN_` (double-underscore nesting, e.g.
//! `AGENTSCAN_SCHEDULER__MAX_PARALLEL_JOBS=16`).

use crate::constants::*;
use crate::{AgentScanError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_parallel_jobs: usize,
    pub max_parallel_agents_per_job: usize,
    pub task_timeout_secs: u64,
    pub job_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub backoff_cap_ms: u64,
    pub cancel_grace_period_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: DEFAULT_MAX_PARALLEL_JOBS,
            max_parallel_agents_per_job: DEFAULT_MAX_PARALLEL_AGENTS_PER_JOB,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            cancel_grace_period_secs: DEFAULT_CANCEL_GRACE_PERIOD_SECS,
        }
    }
}

impl SchedulerConfig {
    /// Queue visibility timeout resolution (Open Question #3 in
    /// SPEC_FULL.md): `task_timeout + cancel_grace_period`.
    pub fn queue_visibility_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.task_timeout_secs + self.cancel_grace_period_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub file: f64,
    pub rule: f64,
    pub title: f64,
    pub location: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            file: DEFAULT_SIMILARITY_WEIGHT_FILE,
            rule: DEFAULT_SIMILARITY_WEIGHT_RULE,
            title: DEFAULT_SIMILARITY_WEIGHT_TITLE,
            location: DEFAULT_SIMILARITY_WEIGHT_LOCATION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub min_agreement_count: usize,
    pub similarity_threshold: f64,
    pub similarity_weights: SimilarityWeights,
    pub agent_weights: std::collections::HashMap<String, f64>,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub consistency_bonus_alpha: f64,
    pub consistency_bonus_max: f64,
    pub fp_reduction_beta: f64,
    pub enable_ml: bool,
    pub ml_blend_weight: f64,
    pub enable_calibration: bool,
    pub min_calibration_samples: usize,
    pub calibration_max_age_days: i64,
    pub reliability_decay_factor: f64,
    pub reliability_min_samples: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_agreement_count: DEFAULT_MIN_AGREEMENT_COUNT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            similarity_weights: SimilarityWeights::default(),
            agent_weights: std::collections::HashMap::new(),
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            medium_threshold: DEFAULT_MEDIUM_THRESHOLD,
            consistency_bonus_alpha: DEFAULT_CONSISTENCY_BONUS_ALPHA,
            consistency_bonus_max: DEFAULT_CONSISTENCY_BONUS_MAX,
            fp_reduction_beta: DEFAULT_FP_REDUCTION_BETA,
            enable_ml: DEFAULT_ENABLE_ML,
            ml_blend_weight: DEFAULT_ML_BLEND_WEIGHT,
            enable_calibration: DEFAULT_ENABLE_CALIBRATION,
            min_calibration_samples: DEFAULT_MIN_CALIBRATION_SAMPLES,
            calibration_max_age_days: DEFAULT_CALIBRATION_MAX_AGE_DAYS,
            reliability_decay_factor: DEFAULT_RELIABILITY_DECAY_FACTOR,
            reliability_min_samples: DEFAULT_RELIABILITY_MIN_SAMPLES,
        }
    }
}

impl ConsensusConfig {
    pub fn agent_weight(&self, agent: &str) -> f64 {
        self.agent_weights.get(agent).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub default_agents: Vec<String>,
    pub max_queue_size: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_agents: vec!["semgrep".to_string(), "bandit".to_string()],
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub consensus: ConsensusConfig,
    pub admission: AdmissionConfig,
}

impl Config {
    /// Loads configuration from (in increasing precedence):
    /// built-in defaults, an optional `AgentScan.toml` in the working
    /// directory, a `.env` file, and `AGENTSCAN_*` environment variables.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("loaded .env from {:?}", path),
            Err(_) => tracing::debug!("no .env file found, continuing with process environment"),
        }

        let defaults = Config::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(AgentScanError::Configuration)?)
            .add_source(config::File::with_name("AgentScan").required(false))
            .add_source(
                config::Environment::with_prefix("AGENTSCAN")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings = builder.build().map_err(AgentScanError::Configuration)?;
        settings
            .try_deserialize()
            .map_err(AgentScanError::Configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = Config::default();
        assert_eq!(config.scheduler.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(
            config.consensus.min_agreement_count,
            DEFAULT_MIN_AGREEMENT_COUNT
        );
        assert_eq!(config.consensus.agent_weight("unknown-tool"), 1.0);
    }

    #[test]
    fn queue_visibility_timeout_matches_open_question_resolution() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(
            scheduler.queue_visibility_timeout(),
            std::time::Duration::from_secs(
                scheduler.task_timeout_secs + scheduler.cancel_grace_period_secs
            )
        );
    }
}
