//! Simulation configuration
//!
//! A single strongly-typed structure enumerating every recognized option.
//! Options split into two groups:
//!
//! - **Business parameters** (`start_year`, [`BusinessParameters`]) change
//!   simulation output and are covered by [`SimulationConfig::config_hash`].
//! - **Operational knobs** (`end_year`, `thread_count`, optimization level,
//!   memory limit, timeouts, retention, [`ResourceSettings`]) only change how
//!   the run executes and are excluded from the hash, so changing them never
//!   blocks a resume.

use crate::checkpoint::compute_config_hash;
use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading/validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Optimization Level
// ============================================================================

/// Resource profile for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Memory-constrained hosts (laptops, small VMs)
    Low,
    #[default]
    Medium,
    /// Dedicated analytical hosts
    High,
}

impl OptimizationLevel {
    /// Memory budget (MB) the ResourceManager enforces.
    pub fn memory_limit_mb(&self) -> u64 {
        match self {
            OptimizationLevel::Low => 2048,
            OptimizationLevel::Medium => 4096,
            OptimizationLevel::High => 8192,
        }
    }

    /// Rows per batch handed to transformation jobs.
    pub fn batch_size(&self) -> usize {
        match self {
            OptimizationLevel::Low => 250,
            OptimizationLevel::Medium => 500,
            OptimizationLevel::High => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::Low => "low",
            OptimizationLevel::Medium => "medium",
            OptimizationLevel::High => "high",
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(OptimizationLevel::Low),
            "medium" => Ok(OptimizationLevel::Medium),
            "high" => Ok(OptimizationLevel::High),
            other => Err(ConfigError::Invalid(format!(
                "unknown optimization level '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

// ============================================================================
// Business Parameters
// ============================================================================

/// Parameters that change simulation output
///
/// All rates are annual fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessParameters {
    /// Seed for the deterministic draw service
    pub random_seed: u64,

    /// Entities in the baseline census
    pub census_size: u32,

    /// Target year-over-year headcount growth
    pub target_growth_rate: f64,

    /// Termination probability for experienced entities
    pub termination_rate: f64,

    /// Termination probability for entities hired this year
    pub new_hire_termination_rate: f64,

    /// Promotion probability (below the top level)
    pub promotion_rate: f64,

    /// Merit increase applied to every continuing entity
    pub merit_raise_rate: f64,

    /// Cost-of-living adjustment applied with the merit increase
    pub cola_rate: f64,

    /// Probability that a non-enrolled entity enrolls this year
    pub enrollment_rate: f64,

    /// Deferral rate assigned on enrollment
    pub default_deferral_rate: f64,

    /// Employer match per deferred dollar
    pub employer_match_rate: f64,

    /// Deferral rate above which no match is paid
    pub employer_match_cap: f64,
}

impl Default for BusinessParameters {
    fn default() -> Self {
        Self {
            random_seed: 42,
            census_size: 1000,
            target_growth_rate: 0.03,
            termination_rate: 0.12,
            new_hire_termination_rate: 0.25,
            promotion_rate: 0.10,
            merit_raise_rate: 0.03,
            cola_rate: 0.01,
            enrollment_rate: 0.60,
            default_deferral_rate: 0.06,
            employer_match_rate: 0.50,
            employer_match_cap: 0.06,
        }
    }
}

impl BusinessParameters {
    fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("termination_rate", self.termination_rate),
            ("new_hire_termination_rate", self.new_hire_termination_rate),
            ("promotion_rate", self.promotion_rate),
            ("merit_raise_rate", self.merit_raise_rate),
            ("cola_rate", self.cola_rate),
            ("enrollment_rate", self.enrollment_rate),
            ("default_deferral_rate", self.default_deferral_rate),
            ("employer_match_rate", self.employer_match_rate),
            ("employer_match_cap", self.employer_match_cap),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.new_hire_termination_rate >= 1.0 {
            return Err(ConfigError::Invalid(
                "new_hire_termination_rate must be < 1".to_string(),
            ));
        }
        if !self.target_growth_rate.is_finite() || self.target_growth_rate <= -1.0 {
            return Err(ConfigError::Invalid(format!(
                "target_growth_rate must be finite and > -1, got {}",
                self.target_growth_rate
            )));
        }
        if self.census_size == 0 {
            return Err(ConfigError::Invalid("census_size must be > 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Resource Settings
// ============================================================================

/// Tuning for the ResourceManager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    /// Memory ratio above which the pool shrinks
    pub high_water_mark: f64,

    /// Memory ratio below which the pool may grow again
    pub low_water_mark: f64,

    /// Consecutive high samples before shrinking
    pub pressure_samples: usize,

    /// Consecutive low samples before growing
    pub headroom_samples: usize,

    /// Consecutive over-limit samples (at one worker) before giving up
    pub exhaustion_samples: usize,

    /// Minimum idle samples before a leak can be reported
    pub leak_min_samples: usize,

    /// Minimum observation window before a leak can be reported
    pub leak_min_elapsed_secs: u64,

    /// Minimum idle-memory growth (MB) across the window
    pub leak_min_growth_mb: u64,

    /// Wait between admission re-checks while over the high-water mark
    pub backpressure_wait_ms: u64,

    /// Admission re-checks before dispatching anyway (or failing over limit)
    pub backpressure_max_waits: usize,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            high_water_mark: 0.75,
            low_water_mark: 0.50,
            pressure_samples: 3,
            headroom_samples: 5,
            exhaustion_samples: 3,
            leak_min_samples: 15,
            leak_min_elapsed_secs: 600,
            leak_min_growth_mb: 64,
            backpressure_wait_ms: 250,
            backpressure_max_waits: 20,
        }
    }
}

// ============================================================================
// Simulation Config
// ============================================================================

fn default_thread_count() -> usize {
    1
}

fn default_job_timeout_secs() -> u64 {
    1800
}

fn default_checkpoint_retention() -> usize {
    1
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// First simulated year
    pub start_year: i32,

    /// Last simulated year (inclusive)
    pub end_year: i32,

    /// Upper bound for the per-stage worker pool
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    #[serde(default)]
    pub optimization_level: OptimizationLevel,

    /// Overrides the optimization level's memory limit
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,

    /// Wall-clock budget per job
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Checkpoints kept after a successful end-to-end run
    #[serde(default = "default_checkpoint_retention")]
    pub checkpoint_retention: usize,

    #[serde(default)]
    pub resources: ResourceSettings,

    #[serde(default)]
    pub business: BusinessParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new(2025, 2029)
    }
}

/// Subset of the configuration covered by the config hash
#[derive(Serialize)]
struct HashedConfig<'a> {
    start_year: i32,
    business: &'a BusinessParameters,
}

impl SimulationConfig {
    /// Config for `start_year..=end_year` with default parameters.
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year,
            end_year,
            thread_count: default_thread_count(),
            optimization_level: OptimizationLevel::default(),
            memory_limit_mb: None,
            job_timeout_secs: default_job_timeout_secs(),
            checkpoint_retention: default_checkpoint_retention(),
            resources: ResourceSettings::default(),
            business: BusinessParameters::default(),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Validate ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_year > self.end_year {
            return Err(ConfigError::Invalid(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        if self.thread_count == 0 {
            return Err(ConfigError::Invalid("thread_count must be >= 1".to_string()));
        }
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::Invalid("job_timeout_secs must be > 0".to_string()));
        }
        if self.memory_limit_mb == Some(0) {
            return Err(ConfigError::Invalid("memory_limit_mb must be > 0".to_string()));
        }
        let r = &self.resources;
        if !(0.0 < r.low_water_mark && r.low_water_mark < r.high_water_mark && r.high_water_mark <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "water marks must satisfy 0 < low ({}) < high ({}) <= 1",
                r.low_water_mark, r.high_water_mark
            )));
        }
        self.business.validate()
    }

    /// Fingerprint of every output-affecting parameter.
    ///
    /// Excludes operational knobs, so e.g. changing `thread_count` between
    /// runs yields the same hash.
    pub fn config_hash(&self) -> Result<String, OrchestrationError> {
        compute_config_hash(&HashedConfig {
            start_year: self.start_year,
            business: &self.business,
        })
    }

    /// Memory limit in MB (explicit override or optimization level default).
    pub fn effective_memory_limit_mb(&self) -> u64 {
        self.memory_limit_mb
            .unwrap_or_else(|| self.optimization_level.memory_limit_mb())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.start_year..=self.end_year
    }
}
