//! Resource sampling, worker-pool sizing and backpressure
//!
//! # Pool sizing
//!
//! The recommended worker count starts at the configured maximum and moves
//! with hysteresis:
//!
//! - above the high-water mark for `pressure_samples` consecutive samples:
//!   halve (never below 1)
//! - below the low-water mark for `headroom_samples` consecutive samples:
//!   add one (never above the maximum)
//! - anywhere in between: both streaks reset
//!
//! # Backpressure
//!
//! There is no collector to trigger, so memory pressure is handled at
//! admission: [`ResourceManager::admit`] delays dispatch of the next parallel
//! job while memory is over the high-water mark and reports
//! `ResourceExhaustion` once memory stays over the hard limit with the pool
//! already down to one worker.
//!
//! # Leak detection
//!
//! Only samples taken while no job is in flight count, so memory held by a
//! running batch never looks like a leak.

use crate::config::{ResourceSettings, SimulationConfig};
use crate::error::OrchestrationError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tracing::{debug, info, warn};

const BYTES_PER_MB: u64 = 1024 * 1024;
const HISTORY_CAPACITY: usize = 1024;
/// Share of idle-sample steps that must not decrease for a leak report
const LEAK_MONOTONIC_RATIO: f64 = 0.9;

/// Raw probe output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    pub memory_used_mb: u64,
    /// Utilization in [0, 1]
    pub cpu_util: f64,
}

/// Source of memory/CPU readings
pub trait ResourceProbe: Send + Sync {
    fn read(&self) -> ProbeReading;
}

/// Probe backed by `sysinfo`
///
/// Reports this process's resident memory, falling back to system-wide used
/// memory when the process cannot be inspected.
pub struct SystemProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn read(&self) -> ProbeReading {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        sys.refresh_cpu();

        let process_mb = self.pid.and_then(|pid| {
            sys.refresh_process(pid);
            sys.process(pid).map(|p| p.memory() / BYTES_PER_MB)
        });
        let memory_used_mb = process_mb.unwrap_or_else(|| sys.used_memory() / BYTES_PER_MB);
        let cpu_util = f64::from(sys.global_cpu_info().cpu_usage()) / 100.0;

        ProbeReading {
            memory_used_mb,
            cpu_util: cpu_util.clamp(0.0, 1.0),
        }
    }
}

/// One observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub memory_used_mb: u64,
    pub memory_limit_mb: u64,
    pub cpu_util: f64,
    /// Time since the manager was created
    pub elapsed: Duration,
    /// True when at least one job was running at sample time
    pub under_load: bool,
}

impl ResourceSample {
    pub fn memory_ratio(&self) -> f64 {
        if self.memory_limit_mb == 0 {
            return 0.0;
        }
        self.memory_used_mb as f64 / self.memory_limit_mb as f64
    }

    pub fn over_limit(&self) -> bool {
        self.memory_used_mb > self.memory_limit_mb
    }
}

#[derive(Debug)]
struct Tracker {
    history: VecDeque<ResourceSample>,
    workers: usize,
    consecutive_high: usize,
    consecutive_low: usize,
    consecutive_over_limit: usize,
}

/// Memory-aware worker-pool advisor
pub struct ResourceManager {
    settings: ResourceSettings,
    max_threads: usize,
    memory_limit_mb: u64,
    probe: Box<dyn ResourceProbe>,
    started: Instant,
    tracker: Mutex<Tracker>,
    in_flight: AtomicUsize,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("max_threads", &self.max_threads)
            .field("memory_limit_mb", &self.memory_limit_mb)
            .field("workers", &self.recommended_worker_count())
            .finish()
    }
}

impl ResourceManager {
    pub fn new(
        max_threads: usize,
        memory_limit_mb: u64,
        settings: ResourceSettings,
        probe: Box<dyn ResourceProbe>,
    ) -> Self {
        let max_threads = max_threads.max(1);
        Self {
            settings,
            max_threads,
            memory_limit_mb,
            probe,
            started: Instant::now(),
            tracker: Mutex::new(Tracker {
                history: VecDeque::new(),
                workers: max_threads,
                consecutive_high: 0,
                consecutive_low: 0,
                consecutive_over_limit: 0,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Manager sized from the run configuration, sampling the live process.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.thread_count,
            config.effective_memory_limit_mb(),
            config.resources.clone(),
            Box::new(SystemProbe::new()),
        )
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    pub fn memory_limit_mb(&self) -> u64 {
        self.memory_limit_mb
    }

    /// Take a reading from the probe and update pool sizing.
    pub fn sample(&self) -> ResourceSample {
        let reading = self.probe.read();
        self.observe(reading, self.started.elapsed())
    }

    /// Record a reading taken at `elapsed` since start.
    pub fn observe(&self, reading: ProbeReading, elapsed: Duration) -> ResourceSample {
        let sample = ResourceSample {
            memory_used_mb: reading.memory_used_mb,
            memory_limit_mb: self.memory_limit_mb,
            cpu_util: reading.cpu_util,
            elapsed,
            under_load: self.in_flight.load(Ordering::SeqCst) > 0,
        };
        let ratio = sample.memory_ratio();

        let mut t = self.tracker.lock();
        if ratio > self.settings.high_water_mark {
            t.consecutive_high += 1;
            t.consecutive_low = 0;
            if t.consecutive_high >= self.settings.pressure_samples && t.workers > 1 {
                let reduced = (t.workers / 2).max(1);
                warn!(
                    memory_used_mb = sample.memory_used_mb,
                    memory_limit_mb = self.memory_limit_mb,
                    from = t.workers,
                    to = reduced,
                    "sustained memory pressure, shrinking worker pool"
                );
                t.workers = reduced;
                t.consecutive_high = 0;
            }
        } else if ratio < self.settings.low_water_mark {
            t.consecutive_low += 1;
            t.consecutive_high = 0;
            if t.consecutive_low >= self.settings.headroom_samples && t.workers < self.max_threads {
                t.workers += 1;
                t.consecutive_low = 0;
                info!(workers = t.workers, "memory headroom restored, growing worker pool");
            }
        } else {
            t.consecutive_high = 0;
            t.consecutive_low = 0;
        }

        if sample.over_limit() {
            t.consecutive_over_limit += 1;
        } else {
            t.consecutive_over_limit = 0;
        }

        if t.history.len() == HISTORY_CAPACITY {
            t.history.pop_front();
        }
        t.history.push_back(sample);
        sample
    }

    /// Pool size for the next parallel wave, in `[1, max_threads]`.
    pub fn recommended_worker_count(&self) -> usize {
        self.tracker.lock().workers
    }

    /// Sustained idle-memory growth.
    ///
    /// Requires at least `leak_min_samples` idle samples spanning at least
    /// `leak_min_elapsed_secs`, growing by at least `leak_min_growth_mb`,
    /// with almost every step non-decreasing.
    pub fn leak_detected(&self) -> bool {
        let t = self.tracker.lock();
        let idle: Vec<&ResourceSample> = t.history.iter().filter(|s| !s.under_load).collect();
        if idle.len() < self.settings.leak_min_samples.max(2) {
            return false;
        }
        let (first, last) = match (idle.first(), idle.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return false,
        };
        let span = last.elapsed.saturating_sub(first.elapsed);
        if span < Duration::from_secs(self.settings.leak_min_elapsed_secs) {
            return false;
        }
        if last.memory_used_mb < first.memory_used_mb + self.settings.leak_min_growth_mb {
            return false;
        }
        let steps = idle.len() - 1;
        let rising = idle
            .windows(2)
            .filter(|w| w[1].memory_used_mb >= w[0].memory_used_mb)
            .count();
        rising as f64 / steps as f64 >= LEAK_MONOTONIC_RATIO
    }

    pub fn job_started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn job_finished(&self) {
        // Saturating: a detached timed-out job may finish after a reset.
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most recent samples, oldest first.
    pub fn history(&self) -> Vec<ResourceSample> {
        self.tracker.lock().history.iter().copied().collect()
    }

    /// Gate dispatch of one parallel job on memory headroom.
    ///
    /// # Errors
    ///
    /// `ResourceExhaustion` when memory stays over the hard limit with a
    /// single worker, or is still over it after every backpressure wait.
    pub fn admit(&self) -> Result<(), OrchestrationError> {
        let wait = Duration::from_millis(self.settings.backpressure_wait_ms);
        let mut waits = 0;
        loop {
            let sample = self.sample();
            if sample.memory_ratio() <= self.settings.high_water_mark {
                return Ok(());
            }

            let (workers, over_streak) = {
                let t = self.tracker.lock();
                (t.workers, t.consecutive_over_limit)
            };
            let exhausted = sample.over_limit()
                && workers == 1
                && over_streak >= self.settings.exhaustion_samples;
            if exhausted || (waits >= self.settings.backpressure_max_waits && sample.over_limit()) {
                return Err(OrchestrationError::ResourceExhaustion {
                    memory_used_mb: sample.memory_used_mb,
                    memory_limit_mb: self.memory_limit_mb,
                    workers,
                });
            }
            if waits >= self.settings.backpressure_max_waits {
                warn!(
                    memory_used_mb = sample.memory_used_mb,
                    memory_limit_mb = self.memory_limit_mb,
                    "dispatching under memory pressure after backpressure waits"
                );
                return Ok(());
            }

            waits += 1;
            debug!(
                waits,
                memory_used_mb = sample.memory_used_mb,
                "over high-water mark, delaying dispatch"
            );
            std::thread::sleep(wait);
        }
    }
}
