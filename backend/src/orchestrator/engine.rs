//! Orchestrator - multi-year year loop
//!
//! # Architecture
//!
//! ```text
//! run(mode):
//!   plan = RecoveryOrchestrator.plan(mode)          resume point or error
//!   for year in plan.start_year..=end_year:
//!     stages = WorkflowBuilder.build_year_workflow(year, first?)
//!     for stage in stages:
//!       FOUNDATION         -> require state[year-1]
//!       STATE_ACCUMULATION -> StateAccumulator.compute_year_state(year)
//!       ParallelExecutionEngine.execute_stage(stage, year)
//!     CheckpointManager.save_checkpoint(year)      only after every stage
//!   prune checkpoints to the retention count
//! ```
//!
//! # Critical Invariants
//!
//! - A checkpoint is written only once every stage of its year succeeded;
//!   a failure leaves the previous year's checkpoint as the latest
//! - Year N never starts without year N-1 state
//! - A conservation violation stops the run

use crate::accumulator::{AccumulationReport, StateAccumulator};
use crate::checkpoint::{CheckpointManager, RecoveryOrchestrator, ResumeMode};
use crate::config::SimulationConfig;
use crate::error::OrchestrationError;
use crate::execution::{JobParams, ParallelExecutionEngine, ResourceManager, StageReport, TransformationExecutor};
use crate::jobs::WorkforceTransformations;
use crate::store::AnalyticalStore;
use crate::workflow::{DependencyClassifier, WorkflowBuilder, WorkflowStage};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Run Results
// ============================================================================

/// Result of one completed year
#[derive(Debug, Clone, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub stages: Vec<StageReport>,
    pub accumulation: Option<AccumulationReport>,
    /// Stage recorded in the year's checkpoint
    pub checkpoint_stage: WorkflowStage,
    pub duration_ms: u64,
}

/// Result of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub config_hash: String,
    pub resumed_from: Option<i32>,
    pub start_year: i32,
    pub end_year: i32,
    pub years: Vec<YearSummary>,
    /// Checkpoint years pruned after the run
    pub pruned_checkpoints: Vec<i32>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives the year loop
pub struct Orchestrator {
    config: SimulationConfig,
    config_hash: String,
    store: Arc<dyn AnalyticalStore>,
    builder: WorkflowBuilder,
    engine: ParallelExecutionEngine,
    accumulator: StateAccumulator,
    checkpoints: Arc<CheckpointManager>,
    recovery: RecoveryOrchestrator,
}

impl Orchestrator {
    /// Orchestrator for the reference workflow with a caller-supplied executor.
    pub fn new(
        config: SimulationConfig,
        store: Arc<dyn AnalyticalStore>,
        executor: Arc<dyn TransformationExecutor>,
        checkpoint_dir: impl Into<PathBuf>,
    ) -> Result<Self, OrchestrationError> {
        config.validate()?;
        let classifier = DependencyClassifier::new();
        let builder = WorkflowBuilder::workforce_default(&classifier)?;
        let engine = ParallelExecutionEngine::new(
            executor,
            classifier,
            Arc::new(ResourceManager::from_config(&config)),
            config.job_timeout(),
        );
        let checkpoints = Arc::new(CheckpointManager::new(checkpoint_dir, Arc::clone(&store))?);
        Self::from_parts(config, store, builder, engine, checkpoints)
    }

    /// Orchestrator running the reference workforce jobs against `store`.
    pub fn workforce(
        config: SimulationConfig,
        store: Arc<dyn AnalyticalStore>,
        checkpoint_dir: impl Into<PathBuf>,
    ) -> Result<Self, OrchestrationError> {
        let executor = Arc::new(WorkforceTransformations::new(Arc::clone(&store), &config));
        Self::new(config, store, executor, checkpoint_dir)
    }

    /// Assemble from explicitly constructed components.
    pub fn from_parts(
        config: SimulationConfig,
        store: Arc<dyn AnalyticalStore>,
        builder: WorkflowBuilder,
        engine: ParallelExecutionEngine,
        checkpoints: Arc<CheckpointManager>,
    ) -> Result<Self, OrchestrationError> {
        config.validate()?;
        let config_hash = config.config_hash()?;
        info!(
            start_year = config.start_year,
            end_year = config.end_year,
            threads = config.thread_count,
            optimization = %config.optimization_level,
            config_hash = %config_hash,
            "orchestrator configured"
        );
        Ok(Self {
            accumulator: StateAccumulator::new(Arc::clone(&store)),
            recovery: RecoveryOrchestrator::new(Arc::clone(&checkpoints)),
            config,
            config_hash,
            store,
            builder,
            engine,
            checkpoints,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn checkpoints(&self) -> &Arc<CheckpointManager> {
        &self.checkpoints
    }

    pub fn recovery(&self) -> &RecoveryOrchestrator {
        &self.recovery
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        self.engine.resources()
    }

    /// Run the configured year range under `mode`.
    pub fn run(&self, mode: ResumeMode) -> Result<RunSummary, OrchestrationError> {
        let plan = self
            .recovery
            .plan(mode, self.config.start_year, &self.config_hash)?;
        if mode == ResumeMode::ForceRestart {
            let discarded = self.checkpoints.cleanup(0)?;
            if !discarded.is_empty() {
                warn!(years = ?discarded, "force restart discarded existing checkpoints");
            }
        }

        let years = if plan.start_year > self.config.end_year {
            info!(
                end_year = self.config.end_year,
                "every configured year is already checkpointed"
            );
            Vec::new()
        } else {
            self.execute_multi_year(plan.start_year, self.config.end_year)?
        };

        let pruned = self.checkpoints.cleanup(self.config.checkpoint_retention)?;
        info!(
            years = years.len(),
            retained = self.config.checkpoint_retention,
            "run completed"
        );
        Ok(RunSummary {
            run_id: self.checkpoints.run_id(),
            config_hash: self.config_hash.clone(),
            resumed_from: plan.resumed_from,
            start_year: plan.start_year,
            end_year: self.config.end_year,
            years,
            pruned_checkpoints: pruned,
        })
    }

    /// Execute `start..=end`, stopping at the first failing year.
    pub fn execute_multi_year(
        &self,
        start: i32,
        end: i32,
    ) -> Result<Vec<YearSummary>, OrchestrationError> {
        let mut summaries = Vec::new();
        for year in start..=end {
            match self.execute_year(year) {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(year, error = %e, remediation = e.remediation(), "year failed, stopping run");
                    return Err(e);
                }
            }
        }
        Ok(summaries)
    }

    /// Execute every stage of `year` and checkpoint it.
    pub fn execute_year(&self, year: i32) -> Result<YearSummary, OrchestrationError> {
        let started = Instant::now();
        let is_first_year = year == self.config.start_year;
        let stages = self.builder.build_year_workflow(year, is_first_year);
        info!(year, is_first_year, stages = stages.len(), "year started");

        let mut reports = Vec::with_capacity(stages.len());
        let mut accumulation = None;
        let mut last_stage = None;

        for stage in &stages {
            if stage.stage == WorkflowStage::Foundation
                && !self.store.state_years()?.contains(&(year - 1))
            {
                return Err(OrchestrationError::MissingPriorState { year: year - 1 });
            }

            if stage.stage == WorkflowStage::StateAccumulation {
                let report = self.accumulator.compute_year_state(year)?;
                if let Some(violation) = report.violation.clone() {
                    return Err(OrchestrationError::StateConservationViolation(violation));
                }
                accumulation = Some(report);
            }

            let mut params = JobParams::new();
            params.insert("stage".to_string(), stage.stage.as_str().to_string());
            params.insert("first_year".to_string(), is_first_year.to_string());
            reports.push(self.engine.execute_stage_with(stage, year, &params)?);
            last_stage = Some(stage.stage);
        }

        let checkpoint_stage = last_stage.ok_or_else(|| {
            OrchestrationError::InvalidWorkflow(format!("no stages apply to year {year}"))
        })?;
        self.checkpoints
            .save_checkpoint(year, checkpoint_stage, &self.config_hash)?;

        if self.engine.resources().leak_detected() {
            warn!(year, "sustained idle memory growth detected");
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(year, duration_ms, "year completed");
        Ok(YearSummary {
            year,
            stages: reports,
            accumulation,
            checkpoint_stage,
            duration_ms,
        })
    }
}
