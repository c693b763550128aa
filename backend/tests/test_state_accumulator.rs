//! State Accumulator Tests
//!
//! Critical invariants tested:
//! - Year N state depends only on state[N-1] and events[N]
//! - Conservation: count(state[y]) - count(state[y-1]) == net(events[y])
//! - Violations are reported as data, not swallowed

use parking_lot::Mutex;
use std::sync::Arc;
use workforce_simulator_core_rs::models::{EntityState, Event};
use workforce_simulator_core_rs::store::{AnalyticalStore, MemoryStore, Metrics, StoreResult};
use workforce_simulator_core_rs::{OrchestrationError, StateAccumulator};

// ============================================================================
// Test Helpers
// ============================================================================

/// Store wrapper recording which partitions were read
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    state_reads: Mutex<Vec<i32>>,
    event_reads: Mutex<Vec<i32>>,
}

impl AnalyticalStore for RecordingStore {
    fn write_events(&self, year: i32, writer: &str, events: Vec<Event>) -> StoreResult<usize> {
        self.inner.write_events(year, writer, events)
    }

    fn read_events(&self, year: i32) -> StoreResult<Vec<Event>> {
        self.event_reads.lock().push(year);
        self.inner.read_events(year)
    }

    fn read_events_from(&self, year: i32, writer: &str) -> StoreResult<Vec<Event>> {
        self.event_reads.lock().push(year);
        self.inner.read_events_from(year, writer)
    }

    fn write_state(&self, year: i32, rows: Vec<EntityState>) -> StoreResult<usize> {
        self.inner.write_state(year, rows)
    }

    fn read_state(&self, year: i32) -> StoreResult<Option<Vec<EntityState>>> {
        self.state_reads.lock().push(year);
        self.inner.read_state(year)
    }

    fn write_metrics(&self, table: &str, year: i32, metrics: Metrics) -> StoreResult<()> {
        self.inner.write_metrics(table, year, metrics)
    }

    fn read_metrics(&self, table: &str, year: i32) -> StoreResult<Option<Metrics>> {
        self.inner.read_metrics(table, year)
    }

    fn event_years(&self) -> StoreResult<Vec<i32>> {
        self.inner.event_years()
    }

    fn state_years(&self) -> StoreResult<Vec<i32>> {
        self.inner.state_years()
    }

    fn metric_tables(&self) -> StoreResult<Vec<String>> {
        self.inner.metric_tables()
    }

    fn metric_years(&self, table: &str) -> StoreResult<Vec<i32>> {
        self.inner.metric_years(table)
    }
}

fn ids(rows: &[EntityState]) -> Vec<&str> {
    rows.iter().map(|r| r.entity_id.as_str()).collect()
}

// ============================================================================
// Scenario {A, B, C}
// ============================================================================

#[test]
fn test_abc_scenario() {
    let store = Arc::new(MemoryStore::new());
    store.write_state(2024, Vec::new()).unwrap();
    store
        .write_events(
            2025,
            "hires",
            vec![
                Event::hire("A", 2025, 1, 5_500_000),
                Event::hire("B", 2025, 1, 5_500_000),
            ],
        )
        .unwrap();
    store
        .write_events(2026, "promotions", vec![Event::promotion("A", 2026, 2)])
        .unwrap();
    store
        .write_events(2026, "terminations", vec![Event::termination("B", 2026)])
        .unwrap();
    store
        .write_events(2026, "hires", vec![Event::hire("C", 2026, 1, 5_500_000)])
        .unwrap();

    let accumulator = StateAccumulator::new(store.clone());

    let first = accumulator.compute_year_state(2025).unwrap();
    assert!(first.is_conserved());
    assert_eq!((first.prior_count, first.current_count, first.net_events), (0, 2, 2));
    assert_eq!(ids(&store.read_state(2025).unwrap().unwrap()), vec!["A", "B"]);

    let second = accumulator.compute_year_state(2026).unwrap();
    assert!(second.is_conserved());
    assert_eq!(second.prior_count, 2);
    assert_eq!(second.current_count, 2);
    assert_eq!(second.net_events, 0);

    let state = store.read_state(2026).unwrap().unwrap();
    assert_eq!(ids(&state), vec!["A", "C"]);
    let a = &state[0];
    assert_eq!(a.level, 2);
    assert_eq!(a.last_promotion_year, Some(2026));
    assert_eq!(a.hire_year, 2025);
    assert_eq!(state[1].hire_year, 2026);
}

#[test]
fn test_reads_only_prior_state_and_current_events() {
    let store = Arc::new(RecordingStore::default());
    for year in 2020..=2024 {
        store
            .write_state(year, vec![EntityState::from_hire(&Event::hire("A", 2020, 1, 100))])
            .unwrap();
        store
            .write_events(year, "merits", vec![Event::merit("A", year, 100 + year as i64)])
            .unwrap();
    }
    store
        .write_events(2025, "merits", vec![Event::merit("A", 2025, 999)])
        .unwrap();

    let report = StateAccumulator::new(store.clone())
        .compute_year_state(2025)
        .unwrap();

    assert!(report.is_conserved());
    assert_eq!(*store.state_reads.lock(), vec![2024]);
    assert_eq!(*store.event_reads.lock(), vec![2025]);
    assert_eq!(
        store.inner.read_state(2025).unwrap().unwrap()[0].compensation_cents,
        999
    );
}

// ============================================================================
// Violations and Missing Inputs
// ============================================================================

#[test]
fn test_violation_is_reported_as_data() {
    let store = Arc::new(MemoryStore::new());
    store
        .write_state(2025, vec![EntityState::from_hire(&Event::hire("A", 2025, 1, 100))])
        .unwrap();
    // Terminating an entity that does not exist cannot change headcount.
    store
        .write_events(2026, "terminations", vec![Event::termination("GHOST", 2026)])
        .unwrap();

    let report = StateAccumulator::new(store.clone())
        .compute_year_state(2026)
        .unwrap();

    let violation = report.violation.expect("violation reported");
    assert_eq!(violation.year, 2026);
    assert_eq!(violation.prior_count, 1);
    assert_eq!(violation.current_count, 1);
    assert_eq!(violation.net_events, -1);
    assert_eq!(violation.discrepancy(), 1);
    assert!(store.read_state(2026).unwrap().is_some());
}

#[test]
fn test_missing_prior_state_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    store
        .write_events(2026, "hires", vec![Event::hire("A", 2026, 1, 100)])
        .unwrap();

    match StateAccumulator::new(store).compute_year_state(2026) {
        Err(OrchestrationError::MissingPriorState { year }) => assert_eq!(year, 2025),
        other => panic!("expected missing prior state, got {other:?}"),
    }
}

#[test]
fn test_recomputing_a_year_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.write_state(2024, Vec::new()).unwrap();
    store
        .write_events(2025, "hires", vec![Event::hire("A", 2025, 1, 100)])
        .unwrap();
    let accumulator = StateAccumulator::new(store.clone());

    let first = accumulator.compute_year_state(2025).unwrap();
    let before = store.dump_state().unwrap();
    let second = accumulator.compute_year_state(2025).unwrap();

    assert_eq!(first, second);
    assert_eq!(before, store.dump_state().unwrap());
}
