//! Checkpoints: durable markers of completed years
//!
//! A checkpoint records that every stage of a year succeeded, under which
//! configuration, and what the analytical store looked like at that moment.
//!
//! # Critical Invariants
//!
//! - **Integrity**: `integrity_hash` is the SHA-256 of the canonical JSON of
//!   every other field; a record whose hash does not recompute is unusable
//! - **Config matching**: a checkpoint only resumes a run with the same
//!   config hash
//! - **State matching**: a checkpoint only resumes a run whose live store
//!   still reproduces `database_state_summary`
//! - **Atomicity**: records are written to a temp file and renamed into place

pub mod manager;
pub mod recovery;
pub mod summary;

pub use manager::{CheckpointInfo, CheckpointManager, LatestPointer};
pub use recovery::{CheckpointStatus, CheckpointValidation, RecoveryOrchestrator, ResumeMode, ResumePlan};
pub use summary::{capture_summary, DatabaseStateSummary, TableSummary};

use crate::error::OrchestrationError;
use crate::workflow::WorkflowStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Version of the on-disk checkpoint record
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Hashing
// ============================================================================

/// Serialize `value` as JSON with every object's keys sorted.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, OrchestrationError> {
    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&canonicalize(value))?)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Deterministic SHA-256 fingerprint of a configuration value.
///
/// Uses canonical JSON, so field order and map iteration order never affect
/// the result.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, OrchestrationError> {
    Ok(sha256_hex(canonical_json(config)?.as_bytes()))
}

// ============================================================================
// Checkpoint Record
// ============================================================================

/// Persisted record of a completed year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub run_id: Uuid,
    pub year: i32,
    /// Last stage completed for `year`
    pub stage: WorkflowStage,
    pub timestamp: DateTime<Utc>,
    pub config_hash: String,
    pub database_state_summary: DatabaseStateSummary,
    pub integrity_hash: String,
}

/// Everything the integrity hash covers
#[derive(Serialize)]
struct CheckpointBody<'a> {
    format_version: u32,
    run_id: &'a Uuid,
    year: i32,
    stage: WorkflowStage,
    timestamp: &'a DateTime<Utc>,
    config_hash: &'a str,
    database_state_summary: &'a DatabaseStateSummary,
}

impl Checkpoint {
    /// Build a sealed record (integrity hash filled in).
    pub fn new(
        run_id: Uuid,
        year: i32,
        stage: WorkflowStage,
        config_hash: impl Into<String>,
        database_state_summary: DatabaseStateSummary,
    ) -> Result<Self, OrchestrationError> {
        let mut checkpoint = Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            run_id,
            year,
            stage,
            timestamp: Utc::now(),
            config_hash: config_hash.into(),
            database_state_summary,
            integrity_hash: String::new(),
        };
        checkpoint.integrity_hash = checkpoint.compute_integrity_hash()?;
        Ok(checkpoint)
    }

    /// SHA-256 over every field except `integrity_hash`.
    pub fn compute_integrity_hash(&self) -> Result<String, OrchestrationError> {
        let body = CheckpointBody {
            format_version: self.format_version,
            run_id: &self.run_id,
            year: self.year,
            stage: self.stage,
            timestamp: &self.timestamp,
            config_hash: &self.config_hash,
            database_state_summary: &self.database_state_summary,
        };
        Ok(sha256_hex(canonical_json(&body)?.as_bytes()))
    }

    /// # Errors
    ///
    /// `CheckpointIntegrity` when the stored hash does not recompute or the
    /// format version is unknown.
    pub fn verify_integrity(&self) -> Result<(), OrchestrationError> {
        if self.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(OrchestrationError::CheckpointIntegrity {
                year: self.year,
                reason: format!(
                    "unsupported format version {} (expected {})",
                    self.format_version, CHECKPOINT_FORMAT_VERSION
                ),
            });
        }
        let expected = self.compute_integrity_hash()?;
        if expected != self.integrity_hash {
            return Err(OrchestrationError::CheckpointIntegrity {
                year: self.year,
                reason: format!(
                    "integrity hash mismatch: stored {}, computed {}",
                    self.integrity_hash, expected
                ),
            });
        }
        Ok(())
    }
}
