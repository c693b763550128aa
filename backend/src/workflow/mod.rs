//! Workflow model: stages, jobs and dependency tags
//!
//! A simulated year runs a fixed, ordered stage taxonomy. Each stage holds an
//! ordered list of jobs; each job is tagged with how it may be scheduled.

pub mod builder;
pub mod classifier;

pub use builder::WorkflowBuilder;
pub use classifier::{DependencyClassifier, Segment};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-year execution phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    Initialization,
    Foundation,
    EventGeneration,
    StateAccumulation,
    Validation,
    Reporting,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 6] = [
        WorkflowStage::Initialization,
        WorkflowStage::Foundation,
        WorkflowStage::EventGeneration,
        WorkflowStage::StateAccumulation,
        WorkflowStage::Validation,
        WorkflowStage::Reporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Initialization => "INITIALIZATION",
            WorkflowStage::Foundation => "FOUNDATION",
            WorkflowStage::EventGeneration => "EVENT_GENERATION",
            WorkflowStage::StateAccumulation => "STATE_ACCUMULATION",
            WorkflowStage::Validation => "VALIDATION",
            WorkflowStage::Reporting => "REPORTING",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling class of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyTag {
    /// Runs alone, in declared order; acts as a barrier
    Sequential,
    /// May run concurrently with other parallel-safe jobs
    ParallelSafe,
    /// Runs only after all `requires` jobs succeeded
    Conditional,
}

impl fmt::Display for DependencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DependencyTag::Sequential => "SEQUENTIAL",
            DependencyTag::ParallelSafe => "PARALLEL_SAFE",
            DependencyTag::Conditional => "CONDITIONAL",
        })
    }
}

/// Which simulated years a stage applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearApplicability {
    FirstYearOnly,
    AllYears,
}

impl YearApplicability {
    pub fn applies(&self, is_first_year: bool) -> bool {
        match self {
            YearApplicability::FirstYearOnly => is_first_year,
            YearApplicability::AllYears => true,
        }
    }
}

/// One named unit of transformation work
///
/// Jobs are idempotent for a given year: re-running one replaces its own
/// year partition with identical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub tag: DependencyTag,
    /// Upstream jobs (same stage, declared earlier) that must succeed first
    #[serde(default)]
    pub requires: Vec<String>,
}

impl Job {
    pub fn sequential(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: DependencyTag::Sequential,
            requires: Vec::new(),
        }
    }

    pub fn parallel_safe(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: DependencyTag::ParallelSafe,
            requires: Vec::new(),
        }
    }

    pub fn conditional<I, S>(name: impl Into<String>, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            tag: DependencyTag::Conditional,
            requires: requires.into_iter().map(Into::into).collect(),
        }
    }
}

/// Stage with its ordered jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub stage: WorkflowStage,
    pub jobs: Vec<Job>,
    pub applicability: YearApplicability,
}

impl StageDefinition {
    pub fn new(stage: WorkflowStage, applicability: YearApplicability) -> Self {
        Self {
            stage,
            jobs: Vec::new(),
            applicability,
        }
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }
}
