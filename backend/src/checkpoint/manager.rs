//! Checkpoint persistence
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/checkpoint_year_<year>.ckpt    one record per completed year
//! <dir>/latest.json                    pointer to the most recent record
//! ```
//!
//! # Record format
//!
//! ```text
//! +--------+---------+----------------------+------------------------+
//! | "WSCK" | version | sha256(payload) 32 B | payload = gzip(json)   |
//! +--------+---------+----------------------+------------------------+
//! ```
//!
//! The outer digest catches any flipped byte before decompression; the
//! record's own `integrity_hash` is verified after parsing.

use crate::checkpoint::summary::{capture_summary, DatabaseStateSummary};
use crate::checkpoint::{Checkpoint, CHECKPOINT_FORMAT_VERSION};
use crate::error::OrchestrationError;
use crate::store::file::{is_temp_file, write_atomic};
use crate::store::AnalyticalStore;
use crate::workflow::WorkflowStage;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAGIC: &[u8; 4] = b"WSCK";
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + DIGEST_LEN;
const FILE_PREFIX: &str = "checkpoint_year_";
const FILE_SUFFIX: &str = ".ckpt";
const LATEST_FILE: &str = "latest.json";

/// Pointer to the most recently written checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub year: i32,
    pub file: String,
    pub config_hash: String,
    pub run_id: Uuid,
    pub written_at: DateTime<Utc>,
}

/// Checkpoint file found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointInfo {
    pub year: i32,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Writes, loads and prunes checkpoint records
pub struct CheckpointManager {
    dir: PathBuf,
    store: Arc<dyn AnalyticalStore>,
    run_id: Uuid,
}

impl CheckpointManager {
    /// Manager over `dir` (created if missing) summarizing `store`.
    pub fn new(
        dir: impl Into<PathBuf>,
        store: Arc<dyn AnalyticalStore>,
    ) -> Result<Self, OrchestrationError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            store,
            run_id: Uuid::new_v4(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn checkpoint_path(&self, year: i32) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{year}{FILE_SUFFIX}"))
    }

    fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Summary of the live store through `year`.
    pub fn live_summary(&self, year: i32) -> Result<DatabaseStateSummary, OrchestrationError> {
        Ok(capture_summary(self.store.as_ref(), year)?)
    }

    /// Capture, seal, compress and atomically persist a checkpoint.
    pub fn save_checkpoint(
        &self,
        year: i32,
        stage: WorkflowStage,
        config_hash: &str,
    ) -> Result<Checkpoint, OrchestrationError> {
        let summary = self.live_summary(year)?;
        let checkpoint = Checkpoint::new(self.run_id, year, stage, config_hash, summary)?;

        let bytes = encode(&checkpoint)?;
        let path = self.checkpoint_path(year);
        write_atomic(&path, &bytes)?;

        let pointer = LatestPointer {
            year,
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            config_hash: config_hash.to_string(),
            run_id: self.run_id,
            written_at: checkpoint.timestamp,
        };
        write_atomic(&self.latest_path(), &serde_json::to_vec_pretty(&pointer)?)?;

        info!(
            year,
            stage = %stage,
            bytes = bytes.len(),
            path = %path.display(),
            "checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Load and verify the checkpoint for `year`.
    ///
    /// # Errors
    ///
    /// - `CheckpointNotFound` if no record exists
    /// - `CheckpointIntegrity` if any byte of the record was altered
    pub fn load_checkpoint(&self, year: i32) -> Result<Checkpoint, OrchestrationError> {
        let path = self.checkpoint_path(year);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrchestrationError::CheckpointNotFound { year })
            }
            Err(e) => return Err(e.into()),
        };
        let checkpoint = decode(year, &bytes)?;
        if checkpoint.year != year {
            return Err(OrchestrationError::CheckpointIntegrity {
                year,
                reason: format!("record names year {} but is stored as {year}", checkpoint.year),
            });
        }
        checkpoint.verify_integrity()?;
        debug!(year, "checkpoint loaded");
        Ok(checkpoint)
    }

    pub fn has_checkpoint(&self, year: i32) -> bool {
        self.checkpoint_path(year).is_file()
    }

    /// Checkpoint files on disk, ascending by year.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, OrchestrationError> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if is_temp_file(&path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let year = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
                .and_then(|y| y.parse::<i32>().ok());
            if let Some(year) = year {
                found.push(CheckpointInfo {
                    year,
                    size_bytes: entry.metadata()?.len(),
                    path,
                });
            }
        }
        found.sort_by_key(|c| c.year);
        Ok(found)
    }

    pub fn checkpoint_years(&self) -> Result<Vec<i32>, OrchestrationError> {
        Ok(self.list_checkpoints()?.into_iter().map(|c| c.year).collect())
    }

    /// The latest pointer, if one was written.
    pub fn latest_pointer(&self) -> Result<Option<LatestPointer>, OrchestrationError> {
        match fs::read(self.latest_path()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Keep the `keep` newest checkpoints; delete the rest and any temp
    /// leftovers. Returns the removed years.
    pub fn cleanup(&self, keep: usize) -> Result<Vec<i32>, OrchestrationError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if is_temp_file(&path) {
                warn!(path = %path.display(), "removing interrupted checkpoint write");
                fs::remove_file(&path)?;
            }
        }

        let mut checkpoints = self.list_checkpoints()?;
        checkpoints.sort_by_key(|c| std::cmp::Reverse(c.year));
        let mut removed = Vec::new();
        for stale in checkpoints.iter().skip(keep) {
            fs::remove_file(&stale.path)?;
            removed.push(stale.year);
        }
        if keep == 0 {
            match fs::remove_file(self.latest_path()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        removed.sort_unstable();
        if !removed.is_empty() {
            info!(removed = ?removed, kept = keep, "pruned checkpoints");
        }
        Ok(removed)
    }
}

fn encode(checkpoint: &Checkpoint) -> Result<Vec<u8>, OrchestrationError> {
    let json = serde_json::to_vec(checkpoint)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let payload = encoder.finish()?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.push(CHECKPOINT_FORMAT_VERSION as u8);
    bytes.extend_from_slice(&Sha256::digest(&payload));
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode(year: i32, bytes: &[u8]) -> Result<Checkpoint, OrchestrationError> {
    let corrupt = |reason: String| OrchestrationError::CheckpointIntegrity { year, reason };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("record truncated to {} bytes", bytes.len())));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    let version = bytes[MAGIC.len()];
    if u32::from(version) != CHECKPOINT_FORMAT_VERSION {
        return Err(corrupt(format!("unsupported record version {version}")));
    }
    let stored_digest = &bytes[MAGIC.len() + 1..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..];
    if Sha256::digest(payload).as_slice() != stored_digest {
        return Err(corrupt("payload digest mismatch".to_string()));
    }

    let mut json = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut json)
        .map_err(|e| corrupt(format!("decompression failed: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| corrupt(format!("malformed record: {e}")))
}
