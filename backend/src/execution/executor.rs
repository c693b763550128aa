//! Transformation executor contract
//!
//! The core treats job implementations as opaque: it hands a list of job
//! names plus the year and receives success, logs and affected row counts.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Extra key/value parameters forwarded to every job invocation
pub type JobParams = BTreeMap<String, String>;

/// Result of one `execute_jobs` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub logs: Vec<String>,
    /// Rows written per table/partition name
    pub affected_row_counts: BTreeMap<String, u64>,
}

impl ExecutionOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Job ran but its output is unacceptable (e.g. a failed validation).
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            logs: vec![message.into()],
            affected_row_counts: BTreeMap::new(),
        }
    }

    pub fn with_rows(mut self, table: impl Into<String>, rows: u64) -> Self {
        *self.affected_row_counts.entry(table.into()).or_insert(0) += rows;
        self
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    /// Fold another outcome into this one; any failure makes the result fail.
    pub fn merge(&mut self, other: ExecutionOutcome) {
        self.success &= other.success;
        self.logs.extend(other.logs);
        for (table, rows) in other.affected_row_counts {
            *self.affected_row_counts.entry(table).or_insert(0) += rows;
        }
    }

    /// Last log line, used as the failure reason.
    pub fn reason(&self) -> String {
        self.logs
            .last()
            .cloned()
            .unwrap_or_else(|| "job reported failure".to_string())
    }
}

/// Errors an executor raises instead of returning an outcome
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

/// Runs named jobs against the analytical store
pub trait TransformationExecutor: Send + Sync {
    /// Execute `job_names` in order for `year`.
    ///
    /// Implementations must be idempotent per `(job, year)`: running a job
    /// twice leaves the same output partition.
    fn execute_jobs(
        &self,
        job_names: &[String],
        year: i32,
        extra_params: &JobParams,
    ) -> Result<ExecutionOutcome, ExecutorError>;
}
