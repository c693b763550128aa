//! Reference workforce transformations
//!
//! A concrete job set so runs are executable end to end. The orchestration
//! core only sees job names; everything here is reachable through
//! [`TransformationExecutor`](crate::execution::TransformationExecutor).

pub mod workforce;

pub use workforce::WorkforceTransformations;

use crate::workflow::{Job, StageDefinition, WorkflowStage, YearApplicability};

pub const SEED_CENSUS: &str = "seed_census";
pub const COMPUTE_WORKFORCE_NEEDS: &str = "compute_workforce_needs";
pub const GENERATE_TERMINATION_EVENTS: &str = "generate_termination_events";
pub const GENERATE_PROMOTION_EVENTS: &str = "generate_promotion_events";
pub const GENERATE_MERIT_EVENTS: &str = "generate_merit_events";
pub const GENERATE_HIRE_EVENTS: &str = "generate_hire_events";
pub const GENERATE_NEW_HIRE_TERMINATION_EVENTS: &str = "generate_new_hire_termination_events";
pub const GENERATE_ENROLLMENT_EVENTS: &str = "generate_enrollment_events";
pub const SUMMARIZE_CONTRIBUTIONS: &str = "summarize_contributions";
pub const VALIDATE_EVENT_UNIQUENESS: &str = "validate_event_uniqueness";
pub const VALIDATE_WORKFORCE_STATE: &str = "validate_workforce_state";
pub const REPORT_YEAR_SUMMARY: &str = "report_year_summary";

/// Metrics table written by `compute_workforce_needs`
pub const WORKFORCE_NEEDS_TABLE: &str = "workforce_needs";
/// Metrics table written by `summarize_contributions`
pub const CONTRIBUTION_SUMMARY_TABLE: &str = "contribution_summary";
/// Metrics table written by `report_year_summary`
pub const YEAR_SUMMARY_TABLE: &str = "year_summary";

/// Stage graph of the reference job set.
pub fn workforce_workflow() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(WorkflowStage::Initialization, YearApplicability::FirstYearOnly)
            .with_job(Job::sequential(SEED_CENSUS)),
        StageDefinition::new(WorkflowStage::Foundation, YearApplicability::AllYears)
            .with_job(Job::sequential(COMPUTE_WORKFORCE_NEEDS)),
        StageDefinition::new(WorkflowStage::EventGeneration, YearApplicability::AllYears)
            .with_job(Job::parallel_safe(GENERATE_TERMINATION_EVENTS))
            .with_job(Job::parallel_safe(GENERATE_PROMOTION_EVENTS))
            .with_job(Job::parallel_safe(GENERATE_MERIT_EVENTS))
            .with_job(Job::parallel_safe(GENERATE_HIRE_EVENTS))
            .with_job(Job::conditional(
                GENERATE_NEW_HIRE_TERMINATION_EVENTS,
                [GENERATE_HIRE_EVENTS],
            ))
            .with_job(Job::conditional(GENERATE_ENROLLMENT_EVENTS, [GENERATE_HIRE_EVENTS])),
        StageDefinition::new(WorkflowStage::StateAccumulation, YearApplicability::AllYears)
            .with_job(Job::parallel_safe(SUMMARIZE_CONTRIBUTIONS)),
        StageDefinition::new(WorkflowStage::Validation, YearApplicability::AllYears)
            .with_job(Job::parallel_safe(VALIDATE_EVENT_UNIQUENESS))
            .with_job(Job::parallel_safe(VALIDATE_WORKFORCE_STATE)),
        StageDefinition::new(WorkflowStage::Reporting, YearApplicability::AllYears)
            .with_job(Job::sequential(REPORT_YEAR_SUMMARY)),
    ]
}
