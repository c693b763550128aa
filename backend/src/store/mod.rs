//! Analytical store abstraction
//!
//! The orchestration core never touches job internals, but it does need to
//! read year partitions (state accumulation, checkpoint summaries). This
//! module defines the partitioned-table contract that jobs and the core share:
//!
//! - **events**: keyed by `(year, writer job)`. Each job owns its partition,
//!   so parallel jobs never share a write target.
//! - **workforce state**: keyed by year.
//! - **metrics**: small named tables keyed by `(table, year)`.
//!
//! Writes replace exactly one partition (delete + insert) and apply a stable
//! sort first, so the union of parallel outputs is byte-reproducible.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::models::{EntityState, Event};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Named integer aggregates for one metrics partition
pub type Metrics = BTreeMap<String, i64>;

/// Errors raised by store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt partition {partition}: {reason}")]
    Corrupt { partition: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Year-partitioned analytical store
///
/// Implementations must be safe to share across worker threads.
pub trait AnalyticalStore: Send + Sync {
    /// Replace the `(year, writer)` event partition. Returns rows written.
    fn write_events(&self, year: i32, writer: &str, events: Vec<Event>) -> StoreResult<usize>;

    /// All events of `year` across writers, in stable sort order.
    fn read_events(&self, year: i32) -> StoreResult<Vec<Event>>;

    /// Events of `year` written by one job.
    fn read_events_from(&self, year: i32, writer: &str) -> StoreResult<Vec<Event>>;

    /// Replace the state partition for `year`. Returns rows written.
    fn write_state(&self, year: i32, rows: Vec<EntityState>) -> StoreResult<usize>;

    /// State partition for `year`; `None` if it was never written.
    fn read_state(&self, year: i32) -> StoreResult<Option<Vec<EntityState>>>;

    /// Replace one metrics partition.
    fn write_metrics(&self, table: &str, year: i32, metrics: Metrics) -> StoreResult<()>;

    fn read_metrics(&self, table: &str, year: i32) -> StoreResult<Option<Metrics>>;

    /// Years with at least one event partition, ascending.
    fn event_years(&self) -> StoreResult<Vec<i32>>;

    /// Years with a state partition, ascending.
    fn state_years(&self) -> StoreResult<Vec<i32>>;

    /// Names of metrics tables, ascending.
    fn metric_tables(&self) -> StoreResult<Vec<String>>;

    /// Years present in a metrics table, ascending.
    fn metric_years(&self, table: &str) -> StoreResult<Vec<i32>>;
}
