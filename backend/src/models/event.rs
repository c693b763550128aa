//! Workforce events
//!
//! Events are the only way entity state changes between years. Each event
//! carries a `deterministic_id` derived from its identifying fields
//! (entity, type, year), so regenerating a year's events yields the same ids
//! and duplicate generation is detectable.
//!
//! # Event Types
//!
//! Declaration order is also the order events are applied to one entity
//! within a year: a hire creates the entity, merit/promotion/enrollment
//! adjust it, and a termination removes it last.
//!
//! # Example
//!
//! ```rust
//! use workforce_simulator_core_rs::models::{Event, EventType};
//!
//! let hire = Event::hire("E000042", 2026, 2, 7_500_000);
//! assert_eq!(hire.event_type, EventType::Hire);
//! assert_eq!(hire.deterministic_id, Event::hire("E000042", 2026, 1, 1).deterministic_id);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Kind of state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Hire,
    Merit,
    Promotion,
    Enrollment,
    Termination,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Hire,
        EventType::Merit,
        EventType::Promotion,
        EventType::Enrollment,
        EventType::Termination,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Hire => "hire",
            EventType::Merit => "merit",
            EventType::Promotion => "promotion",
            EventType::Enrollment => "enrollment",
            EventType::Termination => "termination",
        }
    }

    /// Contribution of one event of this type to year-over-year headcount.
    pub fn headcount_delta(&self) -> i64 {
        match self {
            EventType::Hire => 1,
            EventType::Termination => -1,
            EventType::Merit | EventType::Promotion | EventType::Enrollment => 0,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event effect
///
/// Money is integer cents; rates are basis points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_cents: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferral_rate_bps: Option<u32>,
}

/// One state change for one entity in one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub entity_id: String,
    pub event_type: EventType,
    pub year: i32,
    pub payload: EventPayload,
    pub deterministic_id: String,
}

impl Event {
    pub fn new(
        entity_id: impl Into<String>,
        event_type: EventType,
        year: i32,
        payload: EventPayload,
    ) -> Self {
        let entity_id = entity_id.into();
        let deterministic_id = Self::compute_deterministic_id(&entity_id, event_type, year);
        Self {
            entity_id,
            event_type,
            year,
            payload,
            deterministic_id,
        }
    }

    pub fn hire(entity_id: impl Into<String>, year: i32, level: u8, compensation_cents: i64) -> Self {
        Self::new(
            entity_id,
            EventType::Hire,
            year,
            EventPayload {
                level: Some(level),
                compensation_cents: Some(compensation_cents),
                deferral_rate_bps: None,
            },
        )
    }

    pub fn termination(entity_id: impl Into<String>, year: i32) -> Self {
        Self::new(entity_id, EventType::Termination, year, EventPayload::default())
    }

    pub fn promotion(entity_id: impl Into<String>, year: i32, new_level: u8) -> Self {
        Self::new(
            entity_id,
            EventType::Promotion,
            year,
            EventPayload {
                level: Some(new_level),
                ..EventPayload::default()
            },
        )
    }

    pub fn merit(entity_id: impl Into<String>, year: i32, new_compensation_cents: i64) -> Self {
        Self::new(
            entity_id,
            EventType::Merit,
            year,
            EventPayload {
                compensation_cents: Some(new_compensation_cents),
                ..EventPayload::default()
            },
        )
    }

    pub fn enrollment(entity_id: impl Into<String>, year: i32, deferral_rate_bps: u32) -> Self {
        Self::new(
            entity_id,
            EventType::Enrollment,
            year,
            EventPayload {
                deferral_rate_bps: Some(deferral_rate_bps),
                ..EventPayload::default()
            },
        )
    }

    /// Hash of the identifying fields (entity, type, year).
    pub fn compute_deterministic_id(entity_id: &str, event_type: EventType, year: i32) -> String {
        let mut hasher = Sha256::new();
        hasher.update((entity_id.len() as u64).to_le_bytes());
        hasher.update(entity_id.as_bytes());
        hasher.update(event_type.as_str().as_bytes());
        hasher.update(year.to_le_bytes());
        let digest = hasher.finalize();
        format!("{:x}", digest)[..32].to_string()
    }
}

/// Stable sort applied before any event partition is persisted.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.entity_id
            .cmp(&b.entity_id)
            .then(a.event_type.cmp(&b.event_type))
            .then(a.deterministic_id.cmp(&b.deterministic_id))
    });
}

/// Net headcount change implied by a set of events.
pub fn net_headcount_change(events: &[Event]) -> i64 {
    events.iter().map(|e| e.event_type.headcount_delta()).sum()
}
