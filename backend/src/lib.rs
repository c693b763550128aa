//! Workforce Simulator Core - Rust Engine
//!
//! Orchestration engine for long, resumable, partly parallel multi-year
//! workforce simulations.
//!
//! # Architecture
//!
//! - **rng**: Hash-keyed deterministic random draws
//! - **models**: Domain types (Event, EntityState)
//! - **store**: Year-partitioned analytical store (memory and file backends)
//! - **workflow**: Stage taxonomy, jobs, dependency classification
//! - **execution**: Job executor contract, resource manager, parallel engine
//! - **accumulator**: Year N-1 → year N state derivation
//! - **checkpoint**: Checkpoint records, persistence, resume decisions
//! - **jobs**: Reference workforce transformations
//! - **orchestrator**: Multi-year year loop
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. All randomness is a pure function of (seed, entity, year, event type, salt)
//! 3. `count(state[y]) - count(state[y-1]) == net(events[y])` for every year
//! 4. A year is checkpointed only after every one of its stages succeeded
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use workforce_simulator_core_rs::{MemoryStore, Orchestrator, ResumeMode, SimulationConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut config = SimulationConfig::new(2025, 2026);
//! config.business.census_size = 50;
//!
//! let orchestrator = Orchestrator::workforce(config, Arc::new(MemoryStore::new()), dir.path()).unwrap();
//! let summary = orchestrator.run(ResumeMode::Fresh).unwrap();
//! assert_eq!(summary.years.len(), 2);
//! ```

// Module declarations
pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod execution;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod store;
pub mod workflow;

// Re-exports for convenience
pub use accumulator::{AccumulationReport, StateAccumulator};
pub use checkpoint::{
    compute_config_hash, Checkpoint, CheckpointManager, RecoveryOrchestrator, ResumeMode,
};
pub use config::{BusinessParameters, OptimizationLevel, ResourceSettings, SimulationConfig};
pub use error::OrchestrationError;
pub use execution::{
    ExecutionOutcome, ExecutorError, JobParams, ParallelExecutionEngine, ResourceManager,
    TransformationExecutor,
};
pub use models::{EntityState, Event, EventType};
pub use orchestrator::{Orchestrator, RunSummary, YearSummary};
pub use rng::DeterministicRng;
pub use store::{AnalyticalStore, FileStore, MemoryStore};
pub use workflow::{DependencyClassifier, DependencyTag, Job, StageDefinition, WorkflowBuilder, WorkflowStage};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn workforce_simulator_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::rng::PyDeterministicRng>()?;
    m.add_function(wrap_pyfunction!(ffi::rng::py_config_hash, m)?)?;
    Ok(())
}
