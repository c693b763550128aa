//! File-backed store backend
//!
//! One JSON file per partition under a root directory:
//!
//! ```text
//! <root>/events/<year>/<writer>.json
//! <root>/state/<year>.json
//! <root>/metrics/<table>/<year>.json
//! ```
//!
//! Every write goes to a uniquely named temp file which is fsynced and then
//! renamed over the target, so a crash mid-write leaves either the old
//! partition or the new one, never a torn file.

use crate::models::{sort_events, sort_state, EntityState, Event};
use crate::store::{AnalyticalStore, Metrics, StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const EVENTS_DIR: &str = "events";
const STATE_DIR: &str = "state";
const METRICS_DIR: &str = "metrics";
const TEMP_MARKER: &str = ".tmp.";

/// Write `bytes` to `path` atomically (temp file + fsync + rename).
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!("{file_name}{TEMP_MARKER}{}", Uuid::new_v4()));

    let result: std::io::Result<()> = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        if let Some(parent) = path.parent() {
            // Persist the rename itself; not supported on every platform.
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// True for leftovers of an interrupted [`write_atomic`].
pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(TEMP_MARKER))
        .unwrap_or(false)
}

/// Directory-of-partitions analytical store
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [EVENTS_DIR, STATE_DIR, METRICS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn events_dir(&self, year: i32) -> PathBuf {
        self.root.join(EVENTS_DIR).join(year.to_string())
    }

    fn state_path(&self, year: i32) -> PathBuf {
        self.root.join(STATE_DIR).join(format!("{year}.json"))
    }

    fn metrics_path(&self, table: &str, year: i32) -> PathBuf {
        self.root.join(METRICS_DIR).join(table).join(format!("{year}.json"))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(path, &bytes).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<Option<T>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                partition: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Sorted entries of a directory, skipping temp files.
    fn list_dir(&self, dir: &Path) -> StoreResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !is_temp_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Years encoded in file stems / dir names directly under `dir`.
    fn years_in(&self, dir: &Path) -> StoreResult<Vec<i32>> {
        let mut years: Vec<i32> = self
            .list_dir(dir)?
            .iter()
            .filter_map(|p| p.file_stem())
            .filter_map(|s| s.to_string_lossy().parse::<i32>().ok())
            .collect();
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }
}

impl AnalyticalStore for FileStore {
    fn write_events(&self, year: i32, writer: &str, mut events: Vec<Event>) -> StoreResult<usize> {
        sort_events(&mut events);
        let path = self.events_dir(year).join(format!("{writer}.json"));
        self.write_json(&path, &events)?;
        Ok(events.len())
    }

    fn read_events(&self, year: i32) -> StoreResult<Vec<Event>> {
        let mut events = Vec::new();
        for path in self.list_dir(&self.events_dir(year))? {
            if let Some(partition) = self.read_json::<Vec<Event>>(&path)? {
                events.extend(partition);
            }
        }
        sort_events(&mut events);
        Ok(events)
    }

    fn read_events_from(&self, year: i32, writer: &str) -> StoreResult<Vec<Event>> {
        let path = self.events_dir(year).join(format!("{writer}.json"));
        Ok(self.read_json(&path)?.unwrap_or_default())
    }

    fn write_state(&self, year: i32, mut rows: Vec<EntityState>) -> StoreResult<usize> {
        sort_state(&mut rows);
        self.write_json(&self.state_path(year), &rows)?;
        Ok(rows.len())
    }

    fn read_state(&self, year: i32) -> StoreResult<Option<Vec<EntityState>>> {
        self.read_json(&self.state_path(year))
    }

    fn write_metrics(&self, table: &str, year: i32, metrics: Metrics) -> StoreResult<()> {
        self.write_json(&self.metrics_path(table, year), &metrics)
    }

    fn read_metrics(&self, table: &str, year: i32) -> StoreResult<Option<Metrics>> {
        self.read_json(&self.metrics_path(table, year))
    }

    fn event_years(&self) -> StoreResult<Vec<i32>> {
        self.years_in(&self.root.join(EVENTS_DIR))
    }

    fn state_years(&self) -> StoreResult<Vec<i32>> {
        self.years_in(&self.root.join(STATE_DIR))
    }

    fn metric_tables(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .list_dir(&self.root.join(METRICS_DIR))?
            .iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    fn metric_years(&self, table: &str) -> StoreResult<Vec<i32>> {
        self.years_in(&self.root.join(METRICS_DIR).join(table))
    }
}
