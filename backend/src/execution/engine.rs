//! Parallel execution engine
//!
//! Executes one stage of one year.
//!
//! # Execution model
//!
//! 1. The stage is split into segments by [`DependencyClassifier::plan_segments`].
//! 2. A SEQUENTIAL job runs alone; if it fails, the stage aborts before any
//!    later job starts.
//! 3. A concurrent segment runs in waves. A wave holds every job whose
//!    upstream jobs already succeeded; it runs on a bounded pool sized by
//!    [`ResourceManager::recommended_worker_count`] and ends at a join.
//! 4. The first failure in a wave cancels every job of that wave still
//!    queued, and the stage reports the earliest-declared failing job.
//!
//! # Critical Invariants
//!
//! - Every job runs under the wall-clock budget; overrunning counts as failure
//! - Reports list jobs in declared order, independent of completion order
//! - No job of a later wave starts once an earlier wave failed

use crate::error::OrchestrationError;
use crate::execution::executor::{ExecutionOutcome, JobParams, TransformationExecutor};
use crate::execution::resources::ResourceManager;
use crate::workflow::{DependencyClassifier, DependencyTag, Job, Segment, StageDefinition, WorkflowStage};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of one job inside a stage
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: String,
    pub tag: DependencyTag,
    pub duration_ms: u64,
    pub outcome: ExecutionOutcome,
}

/// Outcome of a successfully executed stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: WorkflowStage,
    pub year: i32,
    /// Largest pool used by any wave (1 for purely sequential stages)
    pub workers: usize,
    /// In declared order
    pub jobs: Vec<JobReport>,
    pub duration_ms: u64,
}

impl StageReport {
    pub fn rows_affected(&self) -> u64 {
        self.jobs
            .iter()
            .flat_map(|j| j.outcome.affected_row_counts.values())
            .sum()
    }
}

enum JobRun {
    Finished(Result<ExecutionOutcome, String>),
    /// Dequeued after a sibling failed
    Skipped,
}

/// Marks a job in flight for the resource manager, also on panic.
struct InFlight(Arc<ResourceManager>);

impl InFlight {
    fn enter(resources: &Arc<ResourceManager>) -> Self {
        resources.job_started();
        Self(Arc::clone(resources))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.job_finished();
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Runs a stage's jobs honoring dependency tags and resource guidance
pub struct ParallelExecutionEngine {
    executor: Arc<dyn TransformationExecutor>,
    classifier: DependencyClassifier,
    resources: Arc<ResourceManager>,
    job_timeout: Duration,
}

impl ParallelExecutionEngine {
    pub fn new(
        executor: Arc<dyn TransformationExecutor>,
        classifier: DependencyClassifier,
        resources: Arc<ResourceManager>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            classifier,
            resources,
            job_timeout,
        }
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn classifier(&self) -> &DependencyClassifier {
        &self.classifier
    }

    /// Execute every job of `stage` for `year`.
    pub fn execute_stage(
        &self,
        stage: &StageDefinition,
        year: i32,
    ) -> Result<StageReport, OrchestrationError> {
        self.execute_stage_with(stage, year, &JobParams::new())
    }

    /// Execute every job of `stage` for `year`, forwarding `params` to each job.
    ///
    /// # Errors
    ///
    /// - `StageExecution` naming the failing job (error, timeout, panic or
    ///   `success = false`)
    /// - `ResourceExhaustion` if admission of a parallel job fails
    pub fn execute_stage_with(
        &self,
        stage: &StageDefinition,
        year: i32,
        params: &JobParams,
    ) -> Result<StageReport, OrchestrationError> {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(stage.jobs.len());
        let mut completed: HashSet<String> = HashSet::new();
        let mut peak_workers = 0;

        info!(year, stage = %stage.stage, jobs = stage.jobs.len(), "stage started");

        for segment in self.classifier.plan_segments(stage) {
            match segment {
                Segment::Sequential(job) => {
                    peak_workers = peak_workers.max(1);
                    let job_started = Instant::now();
                    match self.run_job(&job.name, year, params) {
                        Ok(outcome) => {
                            let duration_ms = elapsed_ms(job_started);
                            debug!(year, stage = %stage.stage, job = %job.name, duration_ms, "job succeeded");
                            completed.insert(job.name.clone());
                            reports.push(JobReport {
                                job: job.name,
                                tag: DependencyTag::Sequential,
                                duration_ms,
                                outcome,
                            });
                        }
                        Err(reason) => {
                            error!(year, stage = %stage.stage, job = %job.name, %reason, "sequential job failed");
                            return Err(OrchestrationError::StageExecution {
                                stage: stage.stage,
                                year,
                                job: job.name,
                                reason,
                            });
                        }
                    }
                }
                Segment::Concurrent(jobs) => {
                    let workers =
                        self.run_segment(stage.stage, year, &jobs, params, &mut completed, &mut reports)?;
                    peak_workers = peak_workers.max(workers);
                }
            }
        }

        let duration_ms = elapsed_ms(started);
        info!(year, stage = %stage.stage, workers = peak_workers, duration_ms, "stage completed");
        Ok(StageReport {
            stage: stage.stage,
            year,
            workers: peak_workers,
            jobs: reports,
            duration_ms,
        })
    }

    /// Run one concurrent segment wave by wave. Returns the peak pool size.
    fn run_segment(
        &self,
        stage: WorkflowStage,
        year: i32,
        jobs: &[(Job, DependencyTag)],
        params: &JobParams,
        completed: &mut HashSet<String>,
        reports: &mut Vec<JobReport>,
    ) -> Result<usize, OrchestrationError> {
        let mut remaining: Vec<usize> = (0..jobs.len()).collect();
        let mut peak = 0;

        while !remaining.is_empty() {
            let (wave, rest): (Vec<usize>, Vec<usize>) = remaining
                .iter()
                .partition(|&&i| jobs[i].0.requires.iter().all(|r| completed.contains(r)));
            if wave.is_empty() {
                let blocked: Vec<&str> = rest.iter().map(|&i| jobs[i].0.name.as_str()).collect();
                return Err(OrchestrationError::InvalidWorkflow(format!(
                    "jobs {blocked:?} in stage {stage} wait on upstream jobs that never ran"
                )));
            }

            let workers = self.resources.recommended_worker_count().min(wave.len()).max(1);
            peak = peak.max(workers);
            debug!(year, %stage, wave = wave.len(), workers, "dispatching wave");

            let mut results = self.run_wave(stage, year, jobs, &wave, workers, params)?;
            results.sort_by_key(|(idx, _, _)| *idx);

            let mut first_failure: Option<(usize, String)> = None;
            let mut skipped = 0;
            for (idx, duration_ms, run) in results {
                let (job, tag) = &jobs[idx];
                match run {
                    JobRun::Finished(Ok(outcome)) => {
                        completed.insert(job.name.clone());
                        reports.push(JobReport {
                            job: job.name.clone(),
                            tag: *tag,
                            duration_ms,
                            outcome,
                        });
                    }
                    JobRun::Finished(Err(reason)) => {
                        error!(year, %stage, job = %job.name, %reason, "parallel job failed");
                        if first_failure.is_none() {
                            first_failure = Some((idx, reason));
                        }
                    }
                    JobRun::Skipped => skipped += 1,
                }
            }

            if let Some((idx, reason)) = first_failure {
                if skipped > 0 {
                    warn!(year, %stage, skipped, "cancelled queued sibling jobs");
                }
                return Err(OrchestrationError::StageExecution {
                    stage,
                    year,
                    job: jobs[idx].0.name.clone(),
                    reason,
                });
            }
            remaining = rest;
        }
        Ok(peak)
    }

    /// Run one wave on a scoped pool of `workers` threads.
    fn run_wave(
        &self,
        stage: WorkflowStage,
        year: i32,
        jobs: &[(Job, DependencyTag)],
        wave: &[usize],
        workers: usize,
        params: &JobParams,
    ) -> Result<Vec<(usize, u64, JobRun)>, OrchestrationError> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<usize>(workers);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, u64, JobRun)>();
        let cancel = AtomicBool::new(false);

        let dispatched: Result<(), OrchestrationError> = thread::scope(|scope| {
            // Owned here so workers see the channel close when dispatch ends.
            let job_tx = job_tx;

            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = &cancel;
                thread::Builder::new()
                    .name(format!("{}-worker-{worker}", stage.as_str().to_lowercase()))
                    .spawn_scoped(scope, move || {
                        for idx in job_rx.iter() {
                            if cancel.load(Ordering::SeqCst) {
                                let _ = result_tx.send((idx, 0, JobRun::Skipped));
                                continue;
                            }
                            let started = Instant::now();
                            let result = self.run_job(&jobs[idx].0.name, year, params);
                            if result.is_err() {
                                cancel.store(true, Ordering::SeqCst);
                            }
                            let _ = result_tx.send((idx, elapsed_ms(started), JobRun::Finished(result)));
                        }
                    })?;
            }

            for &idx in wave {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = self.resources.admit() {
                    cancel.store(true, Ordering::SeqCst);
                    return Err(e);
                }
                if job_tx.send(idx).is_err() {
                    break;
                }
            }
            Ok(())
        });
        dispatched?;

        drop(result_tx);
        Ok(result_rx.iter().collect())
    }

    /// Run one job under the wall-clock budget.
    ///
    /// The job runs on its own thread; on timeout that thread is abandoned
    /// and the job is reported failed.
    fn run_job(&self, job: &str, year: i32, params: &JobParams) -> Result<ExecutionOutcome, String> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let executor = Arc::clone(&self.executor);
        let names = vec![job.to_string()];
        let params = params.clone();
        let guard = InFlight::enter(&self.resources);

        thread::Builder::new()
            .name(format!("job-{job}"))
            .spawn(move || {
                let _guard = guard;
                let result = executor.execute_jobs(&names, year, &params);
                let _ = tx.send(result);
            })
            .map_err(|e| format!("failed to spawn job thread: {e}"))?;

        match rx.recv_timeout(self.job_timeout) {
            Ok(Ok(outcome)) if outcome.success => Ok(outcome),
            Ok(Ok(outcome)) => Err(outcome.reason()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "exceeded wall-clock budget of {:?}",
                self.job_timeout
            )),
            Err(RecvTimeoutError::Disconnected) => Err("job thread panicked".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceSettings;
    use crate::execution::executor::ExecutorError;
    use crate::execution::resources::{ProbeReading, ResourceProbe};
    use crate::workflow::YearApplicability;
    use parking_lot::Mutex;

    struct IdleProbe;

    impl ResourceProbe for IdleProbe {
        fn read(&self) -> ProbeReading {
            ProbeReading {
                memory_used_mb: 10,
                cpu_util: 0.1,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: Option<&'static str>,
    }

    impl TransformationExecutor for Recorder {
        fn execute_jobs(
            &self,
            job_names: &[String],
            _year: i32,
            _extra_params: &JobParams,
        ) -> Result<ExecutionOutcome, ExecutorError> {
            let name = job_names[0].clone();
            self.calls.lock().push(name.clone());
            if Some(name.as_str()) == self.fail {
                return Err(ExecutorError::Failed("boom".to_string()));
            }
            Ok(ExecutionOutcome::succeeded().with_rows(name, 1))
        }
    }

    fn engine(executor: Arc<Recorder>, threads: usize) -> ParallelExecutionEngine {
        let resources = Arc::new(ResourceManager::new(
            threads,
            1024,
            ResourceSettings::default(),
            Box::new(IdleProbe),
        ));
        ParallelExecutionEngine::new(
            executor,
            DependencyClassifier::new(),
            resources,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_reports_follow_declared_order() {
        let recorder = Arc::new(Recorder::default());
        let stage = StageDefinition::new(WorkflowStage::EventGeneration, YearApplicability::AllYears)
            .with_job(Job::parallel_safe("a"))
            .with_job(Job::parallel_safe("b"))
            .with_job(Job::conditional("c", ["a"]))
            .with_job(Job::sequential("d"));

        let report = engine(recorder.clone(), 4).execute_stage(&stage, 2025).unwrap();

        let names: Vec<&str> = report.jobs.iter().map(|j| j.job.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(report.rows_affected(), 4);
        assert_eq!(recorder.calls.lock().last().map(String::as_str), Some("d"));
    }

    #[test]
    fn test_sequential_failure_stops_stage() {
        let recorder = Arc::new(Recorder {
            fail: Some("first"),
            ..Recorder::default()
        });
        let stage = StageDefinition::new(WorkflowStage::Foundation, YearApplicability::AllYears)
            .with_job(Job::sequential("first"))
            .with_job(Job::sequential("second"));

        let err = engine(recorder.clone(), 2).execute_stage(&stage, 2026).unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::StageExecution { ref job, year: 2026, .. } if job == "first"
        ));
        assert_eq!(*recorder.calls.lock(), vec!["first".to_string()]);
    }
}
