//! Dependency classification and stage planning
//!
//! Turns a stage's declared job list into an execution plan:
//!
//! ```text
//! jobs:      S1  P1  P2  C1(P1)  S2  P3
//! segments:  [S1] [P1 P2 C1] [S2] [P3]
//! waves:           {P1,P2} -> {C1}
//! ```
//!
//! SEQUENTIAL jobs are barriers that run alone in declared order. The jobs
//! between two barriers form a segment executed in parallel waves; a
//! CONDITIONAL job joins the first wave after all its upstream jobs succeeded.

use crate::error::OrchestrationError;
use crate::workflow::{DependencyTag, Job, StageDefinition};
use std::collections::{HashMap, HashSet};

/// Slice of a stage's execution plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// One SEQUENTIAL job
    Sequential(Job),
    /// PARALLEL_SAFE and CONDITIONAL jobs between two barriers, declared order
    Concurrent(Vec<(Job, DependencyTag)>),
}

/// Tags jobs SEQUENTIAL / PARALLEL_SAFE / CONDITIONAL
#[derive(Debug, Clone, Default)]
pub struct DependencyClassifier {
    overrides: HashMap<String, DependencyTag>,
}

impl DependencyClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a tag for one job name (e.g. a job known to share a write target).
    pub fn with_override(mut self, job_name: impl Into<String>, tag: DependencyTag) -> Self {
        self.overrides.insert(job_name.into(), tag);
        self
    }

    /// Effective scheduling class of a job.
    ///
    /// Overrides win. A parallel-safe job that declares upstream jobs is
    /// promoted to CONDITIONAL: it cannot start before its inputs exist.
    pub fn classify(&self, job: &Job) -> DependencyTag {
        if let Some(tag) = self.overrides.get(&job.name) {
            return *tag;
        }
        match job.tag {
            DependencyTag::ParallelSafe if !job.requires.is_empty() => DependencyTag::Conditional,
            tag => tag,
        }
    }

    /// Reject stages that cannot be scheduled.
    ///
    /// Job names must be unique, every required job must be declared earlier
    /// in the same stage, and CONDITIONAL jobs must name an upstream.
    pub fn validate_stage(&self, stage: &StageDefinition) -> Result<(), OrchestrationError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for job in &stage.jobs {
            if job.name.is_empty() {
                return Err(OrchestrationError::InvalidWorkflow(format!(
                    "stage {} has a job with an empty name",
                    stage.stage
                )));
            }
            for upstream in &job.requires {
                if !seen.contains(upstream.as_str()) {
                    return Err(OrchestrationError::InvalidWorkflow(format!(
                        "job '{}' in stage {} requires '{}', which is not declared before it",
                        job.name, stage.stage, upstream
                    )));
                }
            }
            if self.classify(job) == DependencyTag::Conditional && job.requires.is_empty() {
                return Err(OrchestrationError::InvalidWorkflow(format!(
                    "conditional job '{}' in stage {} declares no upstream jobs",
                    job.name, stage.stage
                )));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(OrchestrationError::InvalidWorkflow(format!(
                    "duplicate job '{}' in stage {}",
                    job.name, stage.stage
                )));
            }
        }
        Ok(())
    }

    /// Split a stage into barriers and concurrent segments.
    pub fn plan_segments(&self, stage: &StageDefinition) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut pending: Vec<(Job, DependencyTag)> = Vec::new();

        for job in &stage.jobs {
            match self.classify(job) {
                DependencyTag::Sequential => {
                    if !pending.is_empty() {
                        segments.push(Segment::Concurrent(std::mem::take(&mut pending)));
                    }
                    segments.push(Segment::Sequential(job.clone()));
                }
                tag => pending.push((job.clone(), tag)),
            }
        }
        if !pending.is_empty() {
            segments.push(Segment::Concurrent(pending));
        }
        segments
    }
}
