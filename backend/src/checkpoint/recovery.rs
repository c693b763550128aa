//! Resume decisions
//!
//! Decides whether a run may continue from a stored checkpoint and, if so,
//! from which year. Nothing here falls back silently: drift and corruption
//! are errors the operator must resolve, and starting over is only ever the
//! result of an explicit [`ResumeMode::ForceRestart`].

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// How a run treats existing checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Refuse to start if checkpoints exist
    #[default]
    Fresh,
    /// Continue after the latest resumable checkpoint
    Resume,
    /// Ignore every checkpoint
    ForceRestart,
}

/// Where a run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResumePlan {
    pub start_year: i32,
    /// Year of the checkpoint being resumed from
    pub resumed_from: Option<i32>,
}

/// Verdict for one stored checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CheckpointStatus {
    Resumable,
    ConfigurationDrift(String),
    IntegrityFailure(String),
    StateMismatch(String),
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointStatus::Resumable => f.write_str("resumable"),
            CheckpointStatus::ConfigurationDrift(d) => write!(f, "configuration drift ({d})"),
            CheckpointStatus::IntegrityFailure(d) => write!(f, "integrity failure ({d})"),
            CheckpointStatus::StateMismatch(d) => write!(f, "state mismatch ({d})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointValidation {
    pub year: i32,
    pub status: CheckpointStatus,
}

/// Decides whether and where a run may resume
pub struct RecoveryOrchestrator {
    checkpoints: Arc<CheckpointManager>,
}

impl RecoveryOrchestrator {
    pub fn new(checkpoints: Arc<CheckpointManager>) -> Self {
        Self { checkpoints }
    }

    /// Full resumability check for one year.
    ///
    /// Order: existence, integrity, config hash, live state summary.
    pub fn check_resumable(
        &self,
        year: i32,
        current_config_hash: &str,
    ) -> Result<Checkpoint, OrchestrationError> {
        let checkpoint = self.checkpoints.load_checkpoint(year)?;

        if checkpoint.config_hash != current_config_hash {
            return Err(OrchestrationError::ConfigurationDrift {
                year,
                checkpoint_hash: checkpoint.config_hash,
                current_hash: current_config_hash.to_string(),
            });
        }

        let live = self.checkpoints.live_summary(year)?;
        let differences = checkpoint.database_state_summary.diff(&live);
        if !differences.is_empty() {
            return Err(OrchestrationError::StateMismatch {
                year,
                details: differences.join("; "),
            });
        }
        Ok(checkpoint)
    }

    pub fn can_resume_from(&self, year: i32, current_config_hash: &str) -> bool {
        self.check_resumable(year, current_config_hash).is_ok()
    }

    /// Newest checkpoint that passes [`Self::check_resumable`].
    ///
    /// A checkpoint whose summary no longer matches the store is skipped
    /// (an older one may still match). Drift and corruption stop the scan.
    pub fn find_latest_resumable(
        &self,
        current_config_hash: &str,
    ) -> Result<Option<Checkpoint>, OrchestrationError> {
        let mut years = self.checkpoints.checkpoint_years()?;
        years.reverse();

        for year in years {
            match self.check_resumable(year, current_config_hash) {
                Ok(checkpoint) => return Ok(Some(checkpoint)),
                Err(OrchestrationError::StateMismatch { year, details }) => {
                    warn!(year, %details, "checkpoint no longer matches the store, trying an older one");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Decide the first year to execute for `mode`.
    pub fn plan(
        &self,
        mode: ResumeMode,
        start_year: i32,
        current_config_hash: &str,
    ) -> Result<ResumePlan, OrchestrationError> {
        let fresh = ResumePlan {
            start_year,
            resumed_from: None,
        };
        match mode {
            ResumeMode::ForceRestart => {
                info!(start_year, "force restart: ignoring existing checkpoints");
                Ok(fresh)
            }
            ResumeMode::Fresh => {
                let count = self.checkpoints.checkpoint_years()?.len();
                if count > 0 {
                    return Err(OrchestrationError::ExistingCheckpoints { count });
                }
                Ok(fresh)
            }
            ResumeMode::Resume => {
                if self.checkpoints.checkpoint_years()?.is_empty() {
                    info!(start_year, "no checkpoints found, starting from the first year");
                    return Ok(fresh);
                }
                let checkpoint = self
                    .find_latest_resumable(current_config_hash)?
                    .ok_or(OrchestrationError::NoResumableCheckpoint)?;
                info!(
                    checkpoint_year = checkpoint.year,
                    next_year = checkpoint.year + 1,
                    "resuming from checkpoint"
                );
                Ok(ResumePlan {
                    start_year: checkpoint.year + 1,
                    resumed_from: Some(checkpoint.year),
                })
            }
        }
    }

    /// Status of every stored checkpoint, ascending by year.
    pub fn validate_all(
        &self,
        current_config_hash: &str,
    ) -> Result<Vec<CheckpointValidation>, OrchestrationError> {
        let mut report = Vec::new();
        for year in self.checkpoints.checkpoint_years()? {
            let status = match self.check_resumable(year, current_config_hash) {
                Ok(_) => CheckpointStatus::Resumable,
                Err(OrchestrationError::ConfigurationDrift { checkpoint_hash, .. }) => {
                    CheckpointStatus::ConfigurationDrift(format!("checkpoint hash {checkpoint_hash}"))
                }
                Err(OrchestrationError::StateMismatch { details, .. }) => {
                    CheckpointStatus::StateMismatch(details)
                }
                Err(OrchestrationError::CheckpointIntegrity { reason, .. }) => {
                    CheckpointStatus::IntegrityFailure(reason)
                }
                Err(e) => return Err(e),
            };
            report.push(CheckpointValidation { year, status });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityState, Event};
    use crate::store::{AnalyticalStore, MemoryStore};
    use crate::workflow::WorkflowStage;

    fn setup() -> (tempfile::TempDir, Arc<MemoryStore>, RecoveryOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .write_state(2024, vec![EntityState::from_hire(&Event::hire("A", 2024, 1, 100))])
            .unwrap();
        let manager = Arc::new(CheckpointManager::new(dir.path(), store.clone()).unwrap());
        (dir, store, RecoveryOrchestrator::new(manager))
    }

    #[test]
    fn test_fresh_refuses_existing_checkpoints() {
        let (_dir, _store, recovery) = setup();
        assert_eq!(
            recovery.plan(ResumeMode::Fresh, 2025, "h").unwrap().start_year,
            2025
        );

        recovery
            .checkpoints
            .save_checkpoint(2025, WorkflowStage::Reporting, "h")
            .unwrap();
        assert!(matches!(
            recovery.plan(ResumeMode::Fresh, 2025, "h"),
            Err(OrchestrationError::ExistingCheckpoints { count: 1 })
        ));
        assert_eq!(
            recovery.plan(ResumeMode::ForceRestart, 2025, "other").unwrap(),
            ResumePlan {
                start_year: 2025,
                resumed_from: None
            }
        );
    }

    #[test]
    fn test_resume_skips_mismatched_newer_checkpoint() {
        let (_dir, store, recovery) = setup();
        recovery
            .checkpoints
            .save_checkpoint(2025, WorkflowStage::Reporting, "h")
            .unwrap();
        store
            .write_events(2026, "hires", vec![Event::hire("B", 2026, 1, 1)])
            .unwrap();
        recovery
            .checkpoints
            .save_checkpoint(2026, WorkflowStage::Reporting, "h")
            .unwrap();
        store
            .write_events(2026, "hires", vec![Event::hire("C", 2026, 1, 1), Event::hire("D", 2026, 1, 1)])
            .unwrap();

        let plan = recovery.plan(ResumeMode::Resume, 2025, "h").unwrap();
        assert_eq!(plan.resumed_from, Some(2025));
        assert_eq!(plan.start_year, 2026);

        let statuses = recovery.validate_all("h").unwrap();
        assert_eq!(statuses[0].status, CheckpointStatus::Resumable);
        assert!(matches!(statuses[1].status, CheckpointStatus::StateMismatch(_)));
    }

    #[test]
    fn test_drift_is_fail_fast() {
        let (_dir, _store, recovery) = setup();
        recovery
            .checkpoints
            .save_checkpoint(2025, WorkflowStage::Reporting, "old")
            .unwrap();

        assert!(!recovery.can_resume_from(2025, "new"));
        assert!(matches!(
            recovery.plan(ResumeMode::Resume, 2025, "new"),
            Err(OrchestrationError::ConfigurationDrift { year: 2025, .. })
        ));
    }
}
