//! Orchestration error taxonomy
//!
//! Every failure that can stop a multi-year run is one variant of
//! [`OrchestrationError`]. Each variant names the year/stage/job involved and
//! maps to a remediation hint and a process exit code so the CLI can report
//! it without string matching.

use crate::config::ConfigError;
use crate::models::state::ConservationViolation;
use crate::store::StoreError;
use crate::workflow::WorkflowStage;
use thiserror::Error;

/// Errors raised by the orchestration core.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Checkpoint was written under a different business configuration
    #[error(
        "configuration drift at year {year}: checkpoint config hash {checkpoint_hash} \
         does not match active config hash {current_hash}"
    )]
    ConfigurationDrift {
        year: i32,
        checkpoint_hash: String,
        current_hash: String,
    },

    /// Stored checkpoint failed verification on load
    #[error("checkpoint for year {year} failed integrity check: {reason}")]
    CheckpointIntegrity { year: i32, reason: String },

    /// A job failed (or timed out) and aborted its stage
    #[error("job '{job}' failed in stage {stage} of year {year}: {reason}")]
    StageExecution {
        stage: WorkflowStage,
        year: i32,
        job: String,
        reason: String,
    },

    /// Memory stayed over the limit even with a single worker
    #[error(
        "memory exhausted: {memory_used_mb} MB used of {memory_limit_mb} MB limit \
         with {workers} worker(s)"
    )]
    ResourceExhaustion {
        memory_used_mb: u64,
        memory_limit_mb: u64,
        workers: usize,
    },

    /// Year-over-year headcount change disagrees with the year's events
    #[error("state conservation violated: {0}")]
    StateConservationViolation(ConservationViolation),

    /// No checkpoint record exists for the requested year
    #[error("no checkpoint found for year {year}")]
    CheckpointNotFound { year: i32 },

    /// Live database no longer reproduces the checkpoint summary
    #[error("database state through year {year} no longer matches its checkpoint: {details}")]
    StateMismatch { year: i32, details: String },

    /// Resume requested but no checkpoint passes validation
    #[error("no resumable checkpoint found")]
    NoResumableCheckpoint,

    /// Fresh run requested while checkpoints already exist
    #[error("{count} existing checkpoint(s) found; an explicit resume or force-restart is required")]
    ExistingCheckpoints { count: usize },

    /// Year N cannot start because year N-1 state was never accumulated
    #[error("workforce state partition for year {year} is missing")]
    MissingPriorState { year: i32 },

    /// Stage/job graph is malformed
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OrchestrationError {
    /// Operator-facing hint describing how to recover from this error.
    pub fn remediation(&self) -> &'static str {
        match self {
            OrchestrationError::ConfigurationDrift { .. } => {
                "business parameters changed since the checkpoint was written; \
                 restore the original configuration or rerun with --force-restart"
            }
            OrchestrationError::CheckpointIntegrity { .. } => {
                "run `checkpoint validate` to inspect stored checkpoints, \
                 then remove the corrupt file or rerun with --force-restart"
            }
            OrchestrationError::StageExecution { .. } => {
                "inspect the job logs; if the job ran out of memory or time, \
                 lower --threads or raise the memory limit, then rerun with --resume"
            }
            OrchestrationError::ResourceExhaustion { .. } => {
                "raise the memory limit (--optimization high or memory_limit_mb) \
                 or lower --threads"
            }
            OrchestrationError::StateConservationViolation(_) => {
                "event generation produced inconsistent hires/terminations; \
                 fix the offending job and rerun with --resume"
            }
            OrchestrationError::CheckpointNotFound { .. }
            | OrchestrationError::NoResumableCheckpoint => {
                "run `checkpoint status` to see available checkpoints \
                 or start over with --force-restart"
            }
            OrchestrationError::StateMismatch { .. } => {
                "the database was modified after the checkpoint was written; \
                 run `checkpoint validate` or rerun with --force-restart"
            }
            OrchestrationError::ExistingCheckpoints { .. } => {
                "pass --resume to continue or --force-restart to start over"
            }
            OrchestrationError::MissingPriorState { .. } => {
                "the prior year was never accumulated; rerun with --resume \
                 from an earlier checkpoint or with --force-restart"
            }
            OrchestrationError::InvalidWorkflow(_) | OrchestrationError::Config(_) => {
                "fix the configuration and rerun"
            }
            OrchestrationError::Store(_)
            | OrchestrationError::Io(_)
            | OrchestrationError::Serialization(_) => {
                "check disk space and permissions for the data and checkpoint directories"
            }
        }
    }

    /// Process exit status for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            OrchestrationError::Config(_) | OrchestrationError::InvalidWorkflow(_) => 2,
            OrchestrationError::ConfigurationDrift { .. } => 3,
            OrchestrationError::CheckpointIntegrity { .. }
            | OrchestrationError::StateMismatch { .. } => 4,
            OrchestrationError::StageExecution { .. } => 5,
            OrchestrationError::ResourceExhaustion { .. } => 6,
            OrchestrationError::StateConservationViolation(_) => 7,
            OrchestrationError::CheckpointNotFound { .. }
            | OrchestrationError::NoResumableCheckpoint
            | OrchestrationError::ExistingCheckpoints { .. }
            | OrchestrationError::MissingPriorState { .. } => 8,
            OrchestrationError::Store(_)
            | OrchestrationError::Io(_)
            | OrchestrationError::Serialization(_) => 1,
        }
    }
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(err: serde_json::Error) -> Self {
        OrchestrationError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_job_stage_and_year() {
        let err = OrchestrationError::StageExecution {
            stage: WorkflowStage::EventGeneration,
            year: 2027,
            job: "generate_hire_events".to_string(),
            reason: "timed out".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("generate_hire_events"));
        assert!(msg.contains("EVENT_GENERATION"));
        assert!(msg.contains("2027"));
        assert!(err.remediation().contains("--threads"));
    }

    #[test]
    fn test_exit_codes_distinguish_error_classes() {
        let drift = OrchestrationError::ConfigurationDrift {
            year: 2025,
            checkpoint_hash: "a".into(),
            current_hash: "b".into(),
        };
        let integrity = OrchestrationError::CheckpointIntegrity {
            year: 2025,
            reason: "digest".into(),
        };
        assert_ne!(drift.exit_code(), integrity.exit_code());
        assert!(drift.remediation().contains("--force-restart"));
        assert!(integrity.remediation().contains("checkpoint validate"));
    }
}
