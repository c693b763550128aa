// Year-loop behavior of the orchestrator against the in-memory store.

use crate::checkpoint::ResumeMode;
use crate::config::SimulationConfig;
use crate::error::OrchestrationError;
use crate::orchestrator::Orchestrator;
use crate::store::{AnalyticalStore, MemoryStore};
use crate::workflow::WorkflowStage;
use std::sync::Arc;

fn small_config(start: i32, end: i32) -> SimulationConfig {
    let mut config = SimulationConfig::new(start, end);
    config.business.census_size = 120;
    config.job_timeout_secs = 60;
    config
}

#[test]
fn test_three_year_run_conserves_headcount() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let orchestrator =
        Orchestrator::workforce(small_config(2025, 2027), store.clone(), dir.path()).unwrap();

    let summary = orchestrator.run(ResumeMode::Fresh).unwrap();

    assert_eq!(summary.years.len(), 3);
    assert_eq!(summary.resumed_from, None);
    for year in &summary.years {
        let accumulation = year.accumulation.as_ref().unwrap();
        assert!(accumulation.is_conserved());
        assert_eq!(year.checkpoint_stage, WorkflowStage::Reporting);
        assert_eq!(
            accumulation.current_count as i64 - accumulation.prior_count as i64,
            accumulation.net_events
        );
    }
    assert_eq!(summary.years[0].stages[0].stage, WorkflowStage::Initialization);
    assert_eq!(summary.years[1].stages[0].stage, WorkflowStage::Foundation);
    assert_eq!(store.state_years().unwrap(), vec![2024, 2025, 2026, 2027]);
}

#[test]
fn test_retention_prunes_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let orchestrator =
        Orchestrator::workforce(small_config(2025, 2027), store, dir.path()).unwrap();

    let summary = orchestrator.run(ResumeMode::Fresh).unwrap();

    assert_eq!(summary.pruned_checkpoints, vec![2025, 2026]);
    assert_eq!(orchestrator.checkpoints().checkpoint_years().unwrap(), vec![2027]);
}

#[test]
fn test_second_fresh_run_requires_explicit_mode() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let orchestrator =
        Orchestrator::workforce(small_config(2025, 2026), store, dir.path()).unwrap();
    orchestrator.run(ResumeMode::Fresh).unwrap();

    assert!(matches!(
        orchestrator.run(ResumeMode::Fresh),
        Err(OrchestrationError::ExistingCheckpoints { .. })
    ));

    let resumed = orchestrator.run(ResumeMode::Resume).unwrap();
    assert_eq!(resumed.resumed_from, Some(2026));
    assert!(resumed.years.is_empty());

    let restarted = orchestrator.run(ResumeMode::ForceRestart).unwrap();
    assert_eq!(restarted.years.len(), 2);
}

#[test]
fn test_later_year_without_prior_state_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let orchestrator =
        Orchestrator::workforce(small_config(2025, 2027), store, dir.path()).unwrap();

    match orchestrator.execute_year(2026) {
        Err(OrchestrationError::MissingPriorState { year }) => assert_eq!(year, 2025),
        other => panic!("expected missing prior state, got {other:?}"),
    }
    assert!(orchestrator.checkpoints().checkpoint_years().unwrap().is_empty());
}
