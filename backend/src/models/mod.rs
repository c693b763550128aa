//! Domain types: events and per-entity state

pub mod event;
pub mod state;

pub use event::{net_headcount_change, sort_events, Event, EventPayload, EventType};
pub use state::{sort_state, ConservationViolation, EntityState};
