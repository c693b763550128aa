//! Orchestrator - multi-year simulation driver
//!
//! See `engine.rs` for the year loop.

pub mod engine;

#[cfg(test)]
mod tests;

pub use engine::{Orchestrator, RunSummary, YearSummary};
