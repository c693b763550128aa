//! Stage execution
//!
//! - [`executor`]: the job-runner contract the core calls into
//! - [`resources`]: memory/CPU sampling, pool sizing and backpressure
//! - [`engine`]: runs one stage's jobs on a bounded worker pool

pub mod engine;
pub mod executor;
pub mod resources;

pub use engine::{JobReport, ParallelExecutionEngine, StageReport};
pub use executor::{ExecutionOutcome, ExecutorError, JobParams, TransformationExecutor};
pub use resources::{ProbeReading, ResourceManager, ResourceProbe, ResourceSample, SystemProbe};
