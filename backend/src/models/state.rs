//! Per-entity simulation state
//!
//! One [`EntityState`] row exists per active entity per year. Year-N rows
//! are derived only from year-(N-1) rows plus year-N events (see
//! `accumulator`); terminated entities simply have no row.
//!
//! # Critical Invariants
//!
//! 1. **Conservation**: `count(state[y]) - count(state[y-1]) == net(events[y])`
//! 2. **Immutability**: a year's partition is only ever replaced as a whole
//!    when that year is recomputed; past years are never touched.

use crate::models::event::{Event, EventType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one active entity at the end of a year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub year: i32,
    pub level: u8,
    pub compensation_cents: i64,
    pub hire_year: i32,
    pub enrolled: bool,
    pub deferral_rate_bps: u32,
    /// Year of the most recent promotion
    #[serde(default)]
    pub last_promotion_year: Option<i32>,
}

impl EntityState {
    /// New row created by a hire event.
    pub fn from_hire(event: &Event) -> Self {
        Self {
            entity_id: event.entity_id.clone(),
            year: event.year,
            level: event.payload.level.unwrap_or(1),
            compensation_cents: event.payload.compensation_cents.unwrap_or(0),
            hire_year: event.year,
            enrolled: false,
            deferral_rate_bps: 0,
            last_promotion_year: None,
        }
    }

    /// Prior-year row carried into `year` unchanged.
    pub fn carried_forward(&self, year: i32) -> Self {
        Self {
            year,
            ..self.clone()
        }
    }

    /// Apply a non-structural event (merit, promotion, enrollment).
    ///
    /// Hires and terminations change membership and are handled by the
    /// accumulator; they are ignored here.
    pub fn apply(&mut self, event: &Event) {
        match event.event_type {
            EventType::Merit => {
                if let Some(comp) = event.payload.compensation_cents {
                    self.compensation_cents = comp;
                }
            }
            EventType::Promotion => {
                if let Some(level) = event.payload.level {
                    self.level = level;
                }
                self.last_promotion_year = Some(event.year);
            }
            EventType::Enrollment => {
                self.enrolled = true;
                if let Some(rate) = event.payload.deferral_rate_bps {
                    self.deferral_rate_bps = rate;
                }
            }
            EventType::Hire | EventType::Termination => {}
        }
    }
}

/// Stable sort applied before any state partition is persisted.
pub fn sort_state(rows: &mut [EntityState]) {
    rows.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
}

/// Conservation invariant failure, reported as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationViolation {
    pub year: i32,
    pub prior_count: usize,
    pub current_count: usize,
    pub net_events: i64,
}

impl ConservationViolation {
    /// Observed change minus expected change.
    pub fn discrepancy(&self) -> i64 {
        (self.current_count as i64 - self.prior_count as i64) - self.net_events
    }
}

impl fmt::Display for ConservationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year {}: headcount moved {} -> {} ({:+}) but events net to {:+}",
            self.year,
            self.prior_count,
            self.current_count,
            self.current_count as i64 - self.prior_count as i64,
            self.net_events
        )
    }
}
