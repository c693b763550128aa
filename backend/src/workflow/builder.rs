//! Per-year workflow construction
//!
//! The stage/job graph is declared once and validated up front; each year
//! then receives the subset of stages that apply to it. The first simulated
//! year additionally runs INITIALIZATION (baseline census).

use crate::error::OrchestrationError;
use crate::jobs::workforce_workflow;
use crate::workflow::{DependencyClassifier, StageDefinition, WorkflowStage, YearApplicability};

/// Builds the ordered stage list for each simulated year
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    stages: Vec<StageDefinition>,
}

impl WorkflowBuilder {
    /// Validate and wrap a stage graph.
    ///
    /// # Errors
    ///
    /// `InvalidWorkflow` if stages are out of order or repeated, if any stage
    /// fails [`DependencyClassifier::validate_stage`], or if there is no
    /// all-years STATE_ACCUMULATION stage (the year loop depends on it).
    pub fn new(
        stages: Vec<StageDefinition>,
        classifier: &DependencyClassifier,
    ) -> Result<Self, OrchestrationError> {
        for pair in stages.windows(2) {
            if pair[0].stage >= pair[1].stage {
                return Err(OrchestrationError::InvalidWorkflow(format!(
                    "stage {} is declared after {}; stages must be unique and in execution order",
                    pair[1].stage, pair[0].stage
                )));
            }
        }
        for stage in &stages {
            classifier.validate_stage(stage)?;
        }
        let accumulates = stages.iter().any(|s| {
            s.stage == WorkflowStage::StateAccumulation
                && s.applicability == YearApplicability::AllYears
        });
        if !accumulates {
            return Err(OrchestrationError::InvalidWorkflow(
                "workflow must contain a STATE_ACCUMULATION stage applying to all years"
                    .to_string(),
            ));
        }
        Ok(Self { stages })
    }

    /// Builder for the reference workforce job set.
    pub fn workforce_default(classifier: &DependencyClassifier) -> Result<Self, OrchestrationError> {
        Self::new(workforce_workflow(), classifier)
    }

    /// Stages to execute for `year`, in execution order.
    pub fn build_year_workflow(&self, year: i32, is_first_year: bool) -> Vec<StageDefinition> {
        let stages: Vec<StageDefinition> = self
            .stages
            .iter()
            .filter(|s| s.applicability.applies(is_first_year))
            .cloned()
            .collect();
        tracing::debug!(
            year,
            is_first_year,
            stages = stages.len(),
            "built year workflow"
        );
        stages
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }
}
