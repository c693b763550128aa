//! Incremental state accumulation
//!
//! Year-N entity state is derived from exactly two partitions:
//! state[N-1] and events[N]. No older partition is ever read, so the cost of
//! a year is proportional to that year's population, not to the length of
//! the run.
//!
//! # Merge rules (per entity, events in application order)
//!
//! - Hire: inserts a new row (replacing nothing; ids are unique per hire)
//! - Merit / Promotion / Enrollment: update the carried-forward row
//! - Termination: removes the row
//!
//! Events for entities that are neither carried forward nor hired this year
//! are ignored; the conservation check then reports the mismatch.

use crate::error::OrchestrationError;
use crate::models::{net_headcount_change, sort_events, ConservationViolation, EntityState, Event, EventType};
use crate::store::AnalyticalStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of accumulating one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccumulationReport {
    pub year: i32,
    pub prior_count: usize,
    pub current_count: usize,
    pub events_applied: usize,
    pub net_events: i64,
    /// Present when the conservation invariant failed
    pub violation: Option<ConservationViolation>,
}

impl AccumulationReport {
    pub fn is_conserved(&self) -> bool {
        self.violation.is_none()
    }
}

/// Merge prior-year rows with this year's events.
///
/// Returns the new rows (sorted by entity id) and the number of events that
/// changed state.
pub fn merge_year(year: i32, prior: &[EntityState], events: &[Event]) -> (Vec<EntityState>, usize) {
    let mut current: BTreeMap<String, EntityState> = prior
        .iter()
        .map(|row| (row.entity_id.clone(), row.carried_forward(year)))
        .collect();

    let mut ordered = events.to_vec();
    sort_events(&mut ordered);

    let mut applied = 0;
    for event in &ordered {
        match event.event_type {
            EventType::Hire => {
                if current.contains_key(&event.entity_id) {
                    debug!(year, entity = %event.entity_id, "hire for an active entity ignored");
                    continue;
                }
                current.insert(event.entity_id.clone(), EntityState::from_hire(event));
                applied += 1;
            }
            EventType::Termination => {
                if current.remove(&event.entity_id).is_some() {
                    applied += 1;
                } else {
                    debug!(year, entity = %event.entity_id, "termination for an unknown entity ignored");
                }
            }
            EventType::Merit | EventType::Promotion | EventType::Enrollment => {
                match current.get_mut(&event.entity_id) {
                    Some(row) => {
                        row.apply(event);
                        applied += 1;
                    }
                    None => {
                        debug!(year, entity = %event.entity_id, event = %event.event_type, "event for an unknown entity ignored");
                    }
                }
            }
        }
    }

    (current.into_values().collect(), applied)
}

/// `count(state[y]) - count(state[y-1]) == net(events[y])`
pub fn check_conservation(
    year: i32,
    prior_count: usize,
    current_count: usize,
    events: &[Event],
) -> Option<ConservationViolation> {
    let net_events = net_headcount_change(events);
    let observed = current_count as i64 - prior_count as i64;
    if observed == net_events {
        None
    } else {
        Some(ConservationViolation {
            year,
            prior_count,
            current_count,
            net_events,
        })
    }
}

/// Derives year-N state from year-(N-1) state plus year-N events
pub struct StateAccumulator {
    store: Arc<dyn AnalyticalStore>,
}

impl StateAccumulator {
    pub fn new(store: Arc<dyn AnalyticalStore>) -> Self {
        Self { store }
    }

    /// Compute, persist and check state for `year`.
    ///
    /// The state partition is written even when conservation fails, so the
    /// offending rows can be inspected; the caller decides whether to stop.
    ///
    /// # Errors
    ///
    /// `MissingPriorState` if state[year-1] was never written.
    pub fn compute_year_state(&self, year: i32) -> Result<AccumulationReport, OrchestrationError> {
        let prior = self
            .store
            .read_state(year - 1)?
            .ok_or(OrchestrationError::MissingPriorState { year: year - 1 })?;
        let events = self.store.read_events(year)?;

        let (rows, events_applied) = merge_year(year, &prior, &events);
        let current_count = self.store.write_state(year, rows)?;
        let violation = check_conservation(year, prior.len(), current_count, &events);

        let report = AccumulationReport {
            year,
            prior_count: prior.len(),
            current_count,
            events_applied,
            net_events: net_headcount_change(&events),
            violation,
        };
        match &report.violation {
            None => info!(
                year,
                prior = report.prior_count,
                current = report.current_count,
                events = events.len(),
                "state accumulated"
            ),
            Some(v) => warn!(year, discrepancy = v.discrepancy(), "{v}"),
        }
        Ok(report)
    }
}
