//! Parallel Execution Engine Tests
//!
//! Critical invariants tested:
//! - PARALLEL_SAFE jobs actually overlap
//! - A failure cancels queued siblings and names the failing job
//! - CONDITIONAL jobs wait for their upstream, and never run after it failed
//! - The wall-clock budget turns a hung job into a stage failure
//! - Memory pressure shrinks the pool; exhaustion aborts the stage

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use workforce_simulator_core_rs::config::ResourceSettings;
use workforce_simulator_core_rs::execution::{
    ExecutionOutcome, ExecutorError, JobParams, ParallelExecutionEngine, ProbeReading,
    ResourceManager, ResourceProbe, TransformationExecutor,
};
use workforce_simulator_core_rs::workflow::{
    DependencyClassifier, Job, StageDefinition, WorkflowStage, YearApplicability,
};
use workforce_simulator_core_rs::OrchestrationError;

// ============================================================================
// Test Helpers
// ============================================================================

const LIMIT_MB: u64 = 1000;

struct FixedProbe(Arc<AtomicU64>);

impl ResourceProbe for FixedProbe {
    fn read(&self) -> ProbeReading {
        ProbeReading {
            memory_used_mb: self.0.load(Ordering::SeqCst),
            cpu_util: 0.2,
        }
    }
}

/// Executor driven by per-job behavior
#[derive(Default)]
struct ScriptedExecutor {
    calls: Mutex<Vec<String>>,
    failing: Vec<&'static str>,
    sleep: Option<(&'static str, Duration)>,
    barrier: Option<Arc<Barrier>>,
}

impl TransformationExecutor for ScriptedExecutor {
    fn execute_jobs(
        &self,
        job_names: &[String],
        _year: i32,
        _extra_params: &JobParams,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let name = job_names[0].clone();
        self.calls.lock().push(format!("{name}:start"));

        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }
        if let Some((job, duration)) = self.sleep {
            if job == name {
                thread::sleep(duration);
            }
        }

        self.calls.lock().push(format!("{name}:end"));
        if self.failing.contains(&name.as_str()) {
            return Err(ExecutorError::Failed(format!("{name} failed")));
        }
        Ok(ExecutionOutcome::succeeded().with_rows(name, 1))
    }
}

impl ScriptedExecutor {
    fn started(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| c.strip_suffix(":start").map(str::to_string))
            .collect()
    }

    fn position(&self, entry: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .position(|c| c == entry)
            .unwrap_or_else(|| panic!("{entry} never recorded"))
    }
}

fn engine_with(
    executor: Arc<ScriptedExecutor>,
    threads: usize,
    used_mb: Arc<AtomicU64>,
    settings: ResourceSettings,
    timeout: Duration,
) -> ParallelExecutionEngine {
    let resources = Arc::new(ResourceManager::new(
        threads,
        LIMIT_MB,
        settings,
        Box::new(FixedProbe(used_mb)),
    ));
    ParallelExecutionEngine::new(executor, DependencyClassifier::new(), resources, timeout)
}

fn engine(executor: Arc<ScriptedExecutor>, threads: usize) -> ParallelExecutionEngine {
    engine_with(
        executor,
        threads,
        Arc::new(AtomicU64::new(10)),
        ResourceSettings::default(),
        Duration::from_secs(10),
    )
}

fn parallel_stage(names: &[&str]) -> StageDefinition {
    names.iter().fold(
        StageDefinition::new(WorkflowStage::EventGeneration, YearApplicability::AllYears),
        |stage, name| stage.with_job(Job::parallel_safe(*name)),
    )
}

// ============================================================================
// Concurrency and Cancellation
// ============================================================================

#[test]
fn test_parallel_safe_jobs_overlap() {
    // Deadlocks (and times out) unless all four jobs run at once.
    let executor = Arc::new(ScriptedExecutor {
        barrier: Some(Arc::new(Barrier::new(4))),
        ..ScriptedExecutor::default()
    });
    let stage = parallel_stage(&["a", "b", "c", "d"]);

    let report = engine(executor.clone(), 4).execute_stage(&stage, 2026).unwrap();

    assert_eq!(report.workers, 4);
    assert_eq!(report.rows_affected(), 4);
    let names: Vec<&str> = report.jobs.iter().map(|j| j.job.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_failure_cancels_queued_siblings() {
    let executor = Arc::new(ScriptedExecutor {
        failing: vec!["bad"],
        ..ScriptedExecutor::default()
    });
    let stage = parallel_stage(&["bad", "a", "b", "c"]);

    let err = engine(executor.clone(), 1).execute_stage(&stage, 2026).unwrap_err();

    match err {
        OrchestrationError::StageExecution { job, year, stage, reason } => {
            assert_eq!(job, "bad");
            assert_eq!(year, 2026);
            assert_eq!(stage, WorkflowStage::EventGeneration);
            assert!(reason.contains("bad failed"));
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
    assert_eq!(executor.started(), vec!["bad".to_string()]);
}

#[test]
fn test_earliest_declared_failure_is_reported() {
    let executor = Arc::new(ScriptedExecutor {
        failing: vec!["x", "y"],
        barrier: Some(Arc::new(Barrier::new(2))),
        ..ScriptedExecutor::default()
    });
    let stage = parallel_stage(&["x", "y"]);

    let err = engine(executor, 2).execute_stage(&stage, 2025).unwrap_err();

    assert!(matches!(err, OrchestrationError::StageExecution { ref job, .. } if job == "x"));
}

// ============================================================================
// Dependencies
// ============================================================================

#[test]
fn test_conditional_waits_for_upstream() {
    let executor = Arc::new(ScriptedExecutor {
        sleep: Some(("up", Duration::from_millis(50))),
        ..ScriptedExecutor::default()
    });
    let stage = StageDefinition::new(WorkflowStage::EventGeneration, YearApplicability::AllYears)
        .with_job(Job::parallel_safe("up"))
        .with_job(Job::parallel_safe("side"))
        .with_job(Job::conditional("down", ["up"]));

    let report = engine(executor.clone(), 4).execute_stage(&stage, 2026).unwrap();

    assert!(executor.position("up:end") < executor.position("down:start"));
    let names: Vec<&str> = report.jobs.iter().map(|j| j.job.as_str()).collect();
    assert_eq!(names, vec!["up", "side", "down"]);
}

#[test]
fn test_dependent_never_runs_after_upstream_failure() {
    let executor = Arc::new(ScriptedExecutor {
        failing: vec!["up"],
        ..ScriptedExecutor::default()
    });
    let stage = StageDefinition::new(WorkflowStage::EventGeneration, YearApplicability::AllYears)
        .with_job(Job::parallel_safe("up"))
        .with_job(Job::conditional("down", ["up"]));

    let err = engine(executor.clone(), 4).execute_stage(&stage, 2026).unwrap_err();

    assert!(matches!(err, OrchestrationError::StageExecution { ref job, .. } if job == "up"));
    assert!(!executor.started().contains(&"down".to_string()));
}

// ============================================================================
// Wall-Clock Budget
// ============================================================================

#[test]
fn test_hung_job_exceeds_wall_clock_budget() {
    let executor = Arc::new(ScriptedExecutor {
        sleep: Some(("slow", Duration::from_secs(2))),
        ..ScriptedExecutor::default()
    });
    let stage = StageDefinition::new(WorkflowStage::Foundation, YearApplicability::AllYears)
        .with_job(Job::sequential("slow"))
        .with_job(Job::sequential("after"));
    let engine = engine_with(
        executor.clone(),
        2,
        Arc::new(AtomicU64::new(10)),
        ResourceSettings::default(),
        Duration::from_millis(100),
    );

    let err = engine.execute_stage(&stage, 2027).unwrap_err();

    match err {
        OrchestrationError::StageExecution { job, reason, .. } => {
            assert_eq!(job, "slow");
            assert!(reason.contains("wall-clock"), "{reason}");
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
    assert!(!executor.started().contains(&"after".to_string()));
}

// ============================================================================
// Resource Guidance
// ============================================================================

#[test]
fn test_pool_shrinks_under_memory_pressure() {
    let used = Arc::new(AtomicU64::new(800));
    let executor = Arc::new(ScriptedExecutor::default());
    let engine = engine_with(
        executor,
        4,
        used.clone(),
        ResourceSettings::default(),
        Duration::from_secs(10),
    );

    // Three samples at 80% halve the pool, three more halve it again.
    for _ in 0..6 {
        engine.resources().sample();
    }
    assert_eq!(engine.resources().recommended_worker_count(), 1);

    // Between the water marks: admission passes and the pool holds.
    used.store(600, Ordering::SeqCst);
    let report = engine
        .execute_stage(&parallel_stage(&["a", "b", "c", "d"]), 2026)
        .unwrap();

    assert_eq!(report.workers, 1);
    assert_eq!(report.jobs.len(), 4);
}

#[test]
fn test_exhaustion_aborts_stage() {
    let used = Arc::new(AtomicU64::new(1_200));
    let executor = Arc::new(ScriptedExecutor::default());
    let settings = ResourceSettings {
        backpressure_wait_ms: 1,
        backpressure_max_waits: 5,
        ..ResourceSettings::default()
    };
    let engine = engine_with(executor.clone(), 4, used, settings, Duration::from_secs(10));

    let err = engine
        .execute_stage(&parallel_stage(&["a", "b"]), 2026)
        .unwrap_err();

    match err {
        OrchestrationError::ResourceExhaustion {
            memory_used_mb,
            memory_limit_mb,
            ..
        } => {
            assert_eq!(memory_used_mb, 1_200);
            assert_eq!(memory_limit_mb, LIMIT_MB);
        }
        other => panic!("expected resource exhaustion, got {other:?}"),
    }
    assert!(executor.started().is_empty());
}
