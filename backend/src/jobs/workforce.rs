//! Workforce job implementations
//!
//! Every job reads only state[year-1], the year's own partitions, and the
//! metrics its stage depends on; every job writes exactly one partition it
//! owns. All randomness comes from [`DeterministicRng`] keyed by entity,
//! year and event type, and all money is integer cents, so the output is
//! identical for any thread count or job completion order.

use crate::config::{BusinessParameters, SimulationConfig};
use crate::execution::{ExecutionOutcome, ExecutorError, JobParams, TransformationExecutor};
use crate::jobs::*;
use crate::models::{net_headcount_change, EntityState, Event, EventType};
use crate::rng::DeterministicRng;
use crate::store::{AnalyticalStore, Metrics};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Highest job level
pub const MAX_LEVEL: u8 = 5;

/// Base annual compensation by level, in cents
const BASE_COMPENSATION_CENTS: [i64; MAX_LEVEL as usize] =
    [5_500_000, 7_500_000, 10_000_000, 14_000_000, 20_000_000];

/// Cumulative level distribution of the baseline census
const CENSUS_LEVEL_CDF: [f64; MAX_LEVEL as usize] = [0.40, 0.70, 0.87, 0.96, 1.0];

/// Cumulative level distribution of new hires
const HIRE_LEVEL_CDF: [f64; MAX_LEVEL as usize] = [0.60, 0.85, 0.95, 0.99, 1.0];

/// Compensation jitter around the level base, +/- basis points
const COMPENSATION_JITTER_BPS: usize = 1_000;

/// Longest tenure assigned to census entities
const MAX_CENSUS_TENURE_YEARS: usize = 10;

const BPS: i64 = 10_000;

fn rate_bps(rate: f64) -> i64 {
    (rate * BPS as f64).round() as i64
}

fn level_from_cdf(draw: f64, cdf: &[f64]) -> u8 {
    let index = cdf.iter().position(|p| draw < *p).unwrap_or(cdf.len() - 1);
    index as u8 + 1
}

/// Reference [`TransformationExecutor`] over an [`AnalyticalStore`]
pub struct WorkforceTransformations {
    store: Arc<dyn AnalyticalStore>,
    rng: DeterministicRng,
    params: BusinessParameters,
    start_year: i32,
    batch_size: usize,
}

impl WorkforceTransformations {
    pub fn new(store: Arc<dyn AnalyticalStore>, config: &SimulationConfig) -> Self {
        Self {
            store,
            rng: DeterministicRng::new(config.business.random_seed),
            params: config.business.clone(),
            start_year: config.start_year,
            batch_size: config.optimization_level.batch_size().max(1),
        }
    }

    fn run(&self, job: &str, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        match job {
            SEED_CENSUS => self.seed_census(year),
            COMPUTE_WORKFORCE_NEEDS => self.compute_workforce_needs(year),
            GENERATE_TERMINATION_EVENTS => self.generate_termination_events(year),
            GENERATE_PROMOTION_EVENTS => self.generate_promotion_events(year),
            GENERATE_MERIT_EVENTS => self.generate_merit_events(year),
            GENERATE_HIRE_EVENTS => self.generate_hire_events(year),
            GENERATE_NEW_HIRE_TERMINATION_EVENTS => self.generate_new_hire_termination_events(year),
            GENERATE_ENROLLMENT_EVENTS => self.generate_enrollment_events(year),
            SUMMARIZE_CONTRIBUTIONS => self.summarize_contributions(year),
            VALIDATE_EVENT_UNIQUENESS => self.validate_event_uniqueness(year),
            VALIDATE_WORKFORCE_STATE => self.validate_workforce_state(year),
            REPORT_YEAR_SUMMARY => self.report_year_summary(year),
            other => Err(ExecutorError::UnknownJob(other.to_string())),
        }
    }

    fn prior_state(&self, year: i32) -> Result<Vec<EntityState>, ExecutorError> {
        self.store.read_state(year - 1)?.ok_or_else(|| {
            ExecutorError::Failed(format!("workforce state for year {} is missing", year - 1))
        })
    }

    fn jittered_compensation(&self, entity_id: &str, year: i32, level: u8) -> i64 {
        let base = BASE_COMPENSATION_CENTS[usize::from(level - 1)];
        let offset = self.rng.draw_index(
            entity_id,
            year,
            "compensation",
            "",
            2 * COMPENSATION_JITTER_BPS + 1,
        ) as i64
            - COMPENSATION_JITTER_BPS as i64;
        base + base * offset / BPS
    }

    /// Generate events per prior-year entity, batch by batch.
    fn per_entity<F>(&self, prior: &[EntityState], mut generate: F) -> Vec<Event>
    where
        F: FnMut(&EntityState) -> Option<Event>,
    {
        let mut events = Vec::new();
        for (n, batch) in prior.chunks(self.batch_size).enumerate() {
            events.extend(batch.iter().filter_map(&mut generate));
            debug!(batch = n, rows = batch.len(), "processed batch");
        }
        events
    }

    fn write_events(&self, year: i32, job: &str, events: Vec<Event>) -> Result<ExecutionOutcome, ExecutorError> {
        let written = self.store.write_events(year, job, events)?;
        Ok(ExecutionOutcome::succeeded()
            .with_rows("events", written as u64)
            .with_log(format!("{job}: {written} events for {year}")))
    }

    // ========================================================================
    // INITIALIZATION
    // ========================================================================

    /// Baseline census as state[year-1].
    fn seed_census(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        if year != self.start_year {
            return Err(ExecutorError::Failed(format!(
                "census can only be seeded for the first year {}, not {year}",
                self.start_year
            )));
        }
        let census_year = year - 1;
        let rows: Vec<EntityState> = (1..=self.params.census_size)
            .map(|i| {
                let id = format!("E{i:06}");
                let level = level_from_cdf(
                    self.rng.draw(&id, census_year, "census_level", ""),
                    &CENSUS_LEVEL_CDF,
                );
                let tenure = self.rng.draw_index(
                    &id,
                    census_year,
                    "census_tenure",
                    "",
                    MAX_CENSUS_TENURE_YEARS,
                ) as i32;
                let enrolled =
                    self.rng.draw(&id, census_year, "census_enrollment", "") < self.params.enrollment_rate;
                EntityState {
                    compensation_cents: self.jittered_compensation(&id, census_year, level),
                    entity_id: id,
                    year: census_year,
                    level,
                    hire_year: census_year - tenure,
                    enrolled,
                    deferral_rate_bps: if enrolled {
                        rate_bps(self.params.default_deferral_rate) as u32
                    } else {
                        0
                    },
                    last_promotion_year: None,
                }
            })
            .collect();

        let written = self.store.write_state(census_year, rows)?;
        Ok(ExecutionOutcome::succeeded()
            .with_rows("workforce_state", written as u64)
            .with_log(format!("seeded {written} census rows for {census_year}")))
    }

    // ========================================================================
    // FOUNDATION
    // ========================================================================

    fn compute_workforce_needs(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let prior_headcount = self.prior_state(year)?.len() as i64;
        let expected_terminations =
            (prior_headcount as f64 * self.params.termination_rate).round() as i64;
        let target_headcount =
            (prior_headcount as f64 * (1.0 + self.params.target_growth_rate)).round() as i64;
        let gap = (target_headcount - prior_headcount + expected_terminations).max(0);
        let hires_needed =
            (gap as f64 / (1.0 - self.params.new_hire_termination_rate)).ceil() as i64;

        let mut metrics = Metrics::new();
        metrics.insert("prior_headcount".to_string(), prior_headcount);
        metrics.insert("expected_terminations".to_string(), expected_terminations);
        metrics.insert("target_headcount".to_string(), target_headcount);
        metrics.insert("hires_needed".to_string(), hires_needed);
        self.store.write_metrics(WORKFORCE_NEEDS_TABLE, year, metrics)?;

        Ok(ExecutionOutcome::succeeded()
            .with_rows(WORKFORCE_NEEDS_TABLE, 1)
            .with_log(format!("year {year}: {hires_needed} hires needed")))
    }

    // ========================================================================
    // EVENT_GENERATION
    // ========================================================================

    fn generate_termination_events(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let prior = self.prior_state(year)?;
        let events = self.per_entity(&prior, |row| {
            (self.rng.draw(&row.entity_id, year, "termination", "") < self.params.termination_rate)
                .then(|| Event::termination(row.entity_id.clone(), year))
        });
        self.write_events(year, GENERATE_TERMINATION_EVENTS, events)
    }

    fn generate_promotion_events(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let prior = self.prior_state(year)?;
        let events = self.per_entity(&prior, |row| {
            let eligible = row.level < MAX_LEVEL && row.hire_year < year;
            (eligible
                && self.rng.draw(&row.entity_id, year, "promotion", "") < self.params.promotion_rate)
                .then(|| Event::promotion(row.entity_id.clone(), year, row.level + 1))
        });
        self.write_events(year, GENERATE_PROMOTION_EVENTS, events)
    }

    fn generate_merit_events(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let prior = self.prior_state(year)?;
        let raise_bps = rate_bps(self.params.merit_raise_rate) + rate_bps(self.params.cola_rate);
        let events = self.per_entity(&prior, |row| {
            (raise_bps > 0).then(|| {
                let raised = row.compensation_cents + row.compensation_cents * raise_bps / BPS;
                Event::merit(row.entity_id.clone(), year, raised)
            })
        });
        self.write_events(year, GENERATE_MERIT_EVENTS, events)
    }

    fn generate_hire_events(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let needs = self
            .store
            .read_metrics(WORKFORCE_NEEDS_TABLE, year)?
            .ok_or_else(|| ExecutorError::Failed(format!("workforce needs for {year} are missing")))?;
        let hires_needed = needs.get("hires_needed").copied().unwrap_or(0).max(0);

        let events: Vec<Event> = (1..=hires_needed)
            .map(|i| {
                let id = format!("NH{year}_{i:05}");
                let level = level_from_cdf(self.rng.draw(&id, year, "hire_level", ""), &HIRE_LEVEL_CDF);
                let compensation = self.jittered_compensation(&id, year, level);
                Event::hire(id, year, level, compensation)
            })
            .collect();
        self.write_events(year, GENERATE_HIRE_EVENTS, events)
    }

    fn generate_new_hire_termination_events(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let hires = self.store.read_events_from(year, GENERATE_HIRE_EVENTS)?;
        let events: Vec<Event> = hires
            .iter()
            .filter(|hire| {
                self.rng.draw(&hire.entity_id, year, "termination", "new_hire")
                    < self.params.new_hire_termination_rate
            })
            .map(|hire| Event::termination(hire.entity_id.clone(), year))
            .collect();
        self.write_events(year, GENERATE_NEW_HIRE_TERMINATION_EVENTS, events)
    }

    fn generate_enrollment_events(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let prior = self.prior_state(year)?;
        let hires = self.store.read_events_from(year, GENERATE_HIRE_EVENTS)?;
        let deferral_bps = rate_bps(self.params.default_deferral_rate) as u32;

        let candidates = prior
            .iter()
            .filter(|row| !row.enrolled)
            .map(|row| row.entity_id.as_str())
            .chain(hires.iter().map(|e| e.entity_id.as_str()));
        let events: Vec<Event> = candidates
            .filter(|id| self.rng.draw(id, year, "enrollment", "") < self.params.enrollment_rate)
            .map(|id| Event::enrollment(id, year, deferral_bps))
            .collect();
        self.write_events(year, GENERATE_ENROLLMENT_EVENTS, events)
    }

    // ========================================================================
    // STATE_ACCUMULATION
    // ========================================================================

    fn summarize_contributions(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let state = self
            .store
            .read_state(year)?
            .ok_or_else(|| ExecutorError::Failed(format!("workforce state for {year} is missing")))?;
        let cap_bps = rate_bps(self.params.employer_match_cap);
        let match_bps = rate_bps(self.params.employer_match_rate);

        let mut participants = 0i64;
        let mut employee = 0i64;
        let mut employer = 0i64;
        for row in state.iter().filter(|r| r.enrolled) {
            let deferral = i64::from(row.deferral_rate_bps);
            participants += 1;
            employee += row.compensation_cents * deferral / BPS;
            employer += row.compensation_cents * deferral.min(cap_bps) / BPS * match_bps / BPS;
        }

        let mut metrics = Metrics::new();
        metrics.insert("participants".to_string(), participants);
        metrics.insert("employee_contributions_cents".to_string(), employee);
        metrics.insert("employer_match_cents".to_string(), employer);
        metrics.insert("total_contributions_cents".to_string(), employee + employer);
        self.store.write_metrics(CONTRIBUTION_SUMMARY_TABLE, year, metrics)?;

        Ok(ExecutionOutcome::succeeded().with_rows(CONTRIBUTION_SUMMARY_TABLE, 1))
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    fn validate_event_uniqueness(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let events = self.store.read_events(year)?;
        let mut seen = HashSet::with_capacity(events.len());
        for event in &events {
            if event.year != year {
                return Ok(ExecutionOutcome::failed(format!(
                    "event {} is stored under {year} but dated {}",
                    event.deterministic_id, event.year
                )));
            }
            if !seen.insert(event.deterministic_id.as_str()) {
                return Ok(ExecutionOutcome::failed(format!(
                    "duplicate event {} ({} {}) in {year}",
                    event.deterministic_id, event.event_type, event.entity_id
                )));
            }
        }
        Ok(ExecutionOutcome::succeeded().with_log(format!("{} unique events in {year}", events.len())))
    }

    fn validate_workforce_state(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let prior = self.prior_state(year)?;
        let current = self
            .store
            .read_state(year)?
            .ok_or_else(|| ExecutorError::Failed(format!("workforce state for {year} is missing")))?;
        let events = self.store.read_events(year)?;

        if prior.len() as i64 + net_headcount_change(&events) != current.len() as i64 {
            return Ok(ExecutionOutcome::failed(format!(
                "headcount {} + net events {} != {} in {year}",
                prior.len(),
                net_headcount_change(&events),
                current.len()
            )));
        }
        if let Some(pair) = current.windows(2).find(|w| w[0].entity_id >= w[1].entity_id) {
            return Ok(ExecutionOutcome::failed(format!(
                "state rows out of order or duplicated at {}",
                pair[1].entity_id
            )));
        }
        if let Some(row) = current.iter().find(|r| {
            r.year != year || !(1..=MAX_LEVEL).contains(&r.level) || r.compensation_cents <= 0
        }) {
            return Ok(ExecutionOutcome::failed(format!(
                "invalid state row for {} in {year}",
                row.entity_id
            )));
        }
        Ok(ExecutionOutcome::succeeded().with_log(format!("{} state rows valid in {year}", current.len())))
    }

    // ========================================================================
    // REPORTING
    // ========================================================================

    fn report_year_summary(&self, year: i32) -> Result<ExecutionOutcome, ExecutorError> {
        let state = self
            .store
            .read_state(year)?
            .ok_or_else(|| ExecutorError::Failed(format!("workforce state for {year} is missing")))?;
        let events = self.store.read_events(year)?;

        let mut by_type: BTreeMap<EventType, i64> = BTreeMap::new();
        for event in &events {
            *by_type.entry(event.event_type).or_insert(0) += 1;
        }
        let headcount = state.len() as i64;
        let total_compensation: i64 = state.iter().map(|r| r.compensation_cents).sum();
        let enrolled = state.iter().filter(|r| r.enrolled).count() as i64;

        let mut metrics = Metrics::new();
        metrics.insert("headcount".to_string(), headcount);
        for event_type in EventType::ALL {
            metrics.insert(
                format!("{event_type}_events"),
                by_type.get(&event_type).copied().unwrap_or(0),
            );
        }
        metrics.insert("total_compensation_cents".to_string(), total_compensation);
        metrics.insert(
            "average_compensation_cents".to_string(),
            if headcount > 0 { total_compensation / headcount } else { 0 },
        );
        metrics.insert(
            "participation_bps".to_string(),
            if headcount > 0 { enrolled * BPS / headcount } else { 0 },
        );
        self.store.write_metrics(YEAR_SUMMARY_TABLE, year, metrics)?;

        Ok(ExecutionOutcome::succeeded()
            .with_rows(YEAR_SUMMARY_TABLE, 1)
            .with_log(format!("year {year}: headcount {headcount}")))
    }
}

impl TransformationExecutor for WorkforceTransformations {
    fn execute_jobs(
        &self,
        job_names: &[String],
        year: i32,
        extra_params: &JobParams,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let mut outcome = ExecutionOutcome::succeeded();
        for job in job_names {
            debug!(year, job = %job, params = ?extra_params, "running job");
            outcome.merge(self.run(job, year)?);
            if !outcome.success {
                break;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn jobs(census: u32) -> (Arc<MemoryStore>, WorkforceTransformations) {
        let store = Arc::new(MemoryStore::new());
        let mut config = SimulationConfig::new(2025, 2027);
        config.business.census_size = census;
        let jobs = WorkforceTransformations::new(store.clone(), &config);
        (store, jobs)
    }

    fn run(jobs: &WorkforceTransformations, names: &[&str], year: i32) -> ExecutionOutcome {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        jobs.execute_jobs(&names, year, &JobParams::new()).unwrap()
    }

    #[test]
    fn test_census_is_reproducible() {
        let (a, jobs_a) = jobs(200);
        let (b, jobs_b) = jobs(200);
        run(&jobs_a, &[SEED_CENSUS], 2025);
        run(&jobs_b, &[SEED_CENSUS], 2025);

        let rows = a.read_state(2024).unwrap().unwrap();
        assert_eq!(rows.len(), 200);
        assert_eq!(rows, b.read_state(2024).unwrap().unwrap());
        assert!(rows.iter().all(|r| (1..=MAX_LEVEL).contains(&r.level) && r.compensation_cents > 0));
        assert!(rows.iter().all(|r| r.hire_year <= 2024));
    }

    #[test]
    fn test_census_only_for_first_year() {
        let (_store, jobs) = jobs(10);
        let names = vec![SEED_CENSUS.to_string()];
        assert!(jobs.execute_jobs(&names, 2026, &JobParams::new()).is_err());
    }

    #[test]
    fn test_hires_follow_workforce_needs() {
        let (store, jobs) = jobs(500);
        run(&jobs, &[SEED_CENSUS, COMPUTE_WORKFORCE_NEEDS, GENERATE_HIRE_EVENTS], 2025);

        let needs = store.read_metrics(WORKFORCE_NEEDS_TABLE, 2025).unwrap().unwrap();
        let hires = store.read_events_from(2025, GENERATE_HIRE_EVENTS).unwrap();
        assert_eq!(hires.len() as i64, needs["hires_needed"]);
        assert!(hires.iter().all(|e| e.entity_id.starts_with("NH2025_")));
    }

    #[test]
    fn test_unknown_job_is_rejected() {
        let (_store, jobs) = jobs(10);
        let names = vec!["drop_everything".to_string()];
        assert!(matches!(
            jobs.execute_jobs(&names, 2025, &JobParams::new()),
            Err(ExecutorError::UnknownJob(_))
        ));
    }

    #[test]
    fn test_duplicate_events_fail_validation() {
        let (store, jobs) = jobs(10);
        store
            .write_events(2025, "a", vec![Event::termination("E000001", 2025)])
            .unwrap();
        store
            .write_events(2025, "b", vec![Event::termination("E000001", 2025)])
            .unwrap();

        let outcome = run(&jobs, &[VALIDATE_EVENT_UNIQUENESS], 2025);
        assert!(!outcome.success);
        assert!(outcome.reason().contains("duplicate"));
    }

    #[test]
    fn test_level_from_cdf_bounds() {
        assert_eq!(level_from_cdf(0.0, &HIRE_LEVEL_CDF), 1);
        assert_eq!(level_from_cdf(0.9999, &HIRE_LEVEL_CDF), 5);
        assert_eq!(level_from_cdf(0.7, &HIRE_LEVEL_CDF), 2);
    }
}
