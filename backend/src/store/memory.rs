//! In-memory store backend
//!
//! Thread-safe reference implementation used by tests and embedded runs.
//! `dump_events` / `dump_state` give a canonical byte rendering used to
//! compare runs for byte-identical output.

use crate::models::{sort_events, sort_state, EntityState, Event};
use crate::store::{AnalyticalStore, Metrics, StoreError, StoreResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Serialize)]
struct Tables {
    events: BTreeMap<i32, BTreeMap<String, Vec<Event>>>,
    state: BTreeMap<i32, Vec<EntityState>>,
    metrics: BTreeMap<String, BTreeMap<i32, Metrics>>,
}

/// In-memory analytical store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical JSON rendering of every event partition.
    pub fn dump_events(&self) -> StoreResult<Vec<u8>> {
        let tables = self.tables.read();
        serde_json::to_vec(&tables.events).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Canonical JSON rendering of every state partition.
    pub fn dump_state(&self) -> StoreResult<Vec<u8>> {
        let tables = self.tables.read();
        serde_json::to_vec(&tables.state).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl AnalyticalStore for MemoryStore {
    fn write_events(&self, year: i32, writer: &str, mut events: Vec<Event>) -> StoreResult<usize> {
        sort_events(&mut events);
        let count = events.len();
        self.tables
            .write()
            .events
            .entry(year)
            .or_default()
            .insert(writer.to_string(), events);
        Ok(count)
    }

    fn read_events(&self, year: i32) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read();
        let mut events: Vec<Event> = tables
            .events
            .get(&year)
            .map(|writers| writers.values().flatten().cloned().collect())
            .unwrap_or_default();
        sort_events(&mut events);
        Ok(events)
    }

    fn read_events_from(&self, year: i32, writer: &str) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read();
        Ok(tables
            .events
            .get(&year)
            .and_then(|writers| writers.get(writer))
            .cloned()
            .unwrap_or_default())
    }

    fn write_state(&self, year: i32, mut rows: Vec<EntityState>) -> StoreResult<usize> {
        sort_state(&mut rows);
        let count = rows.len();
        self.tables.write().state.insert(year, rows);
        Ok(count)
    }

    fn read_state(&self, year: i32) -> StoreResult<Option<Vec<EntityState>>> {
        Ok(self.tables.read().state.get(&year).cloned())
    }

    fn write_metrics(&self, table: &str, year: i32, metrics: Metrics) -> StoreResult<()> {
        self.tables
            .write()
            .metrics
            .entry(table.to_string())
            .or_default()
            .insert(year, metrics);
        Ok(())
    }

    fn read_metrics(&self, table: &str, year: i32) -> StoreResult<Option<Metrics>> {
        Ok(self
            .tables
            .read()
            .metrics
            .get(table)
            .and_then(|years| years.get(&year))
            .cloned())
    }

    fn event_years(&self) -> StoreResult<Vec<i32>> {
        Ok(self.tables.read().events.keys().copied().collect())
    }

    fn state_years(&self) -> StoreResult<Vec<i32>> {
        Ok(self.tables.read().state.keys().copied().collect())
    }

    fn metric_tables(&self) -> StoreResult<Vec<String>> {
        Ok(self.tables.read().metrics.keys().cloned().collect())
    }

    fn metric_years(&self, table: &str) -> StoreResult<Vec<i32>> {
        Ok(self
            .tables
            .read()
            .metrics
            .get(table)
            .map(|years| years.keys().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_replaces_only_its_partition() {
        let store = MemoryStore::new();
        store
            .write_events(2025, "hires", vec![Event::hire("A", 2025, 1, 10)])
            .unwrap();
        store
            .write_events(2025, "terms", vec![Event::termination("Z", 2025)])
            .unwrap();
        store
            .write_events(2025, "hires", vec![Event::hire("B", 2025, 1, 10)])
            .unwrap();

        let ids: Vec<String> = store
            .read_events(2025)
            .unwrap()
            .into_iter()
            .map(|e| e.entity_id)
            .collect();
        assert_eq!(ids, vec!["B".to_string(), "Z".to_string()]);
    }

    #[test]
    fn test_read_events_is_sorted_regardless_of_writer_order() {
        let a = MemoryStore::new();
        a.write_events(2025, "x", vec![Event::hire("C", 2025, 1, 1)]).unwrap();
        a.write_events(2025, "y", vec![Event::hire("A", 2025, 1, 1)]).unwrap();

        let b = MemoryStore::new();
        b.write_events(2025, "y", vec![Event::hire("A", 2025, 1, 1)]).unwrap();
        b.write_events(2025, "x", vec![Event::hire("C", 2025, 1, 1)]).unwrap();

        assert_eq!(a.read_events(2025).unwrap(), b.read_events(2025).unwrap());
        assert_eq!(a.dump_events().unwrap(), b.dump_events().unwrap());
    }

    #[test]
    fn test_missing_state_partition_is_none() {
        let store = MemoryStore::new();
        assert!(store.read_state(2024).unwrap().is_none());
        store.write_state(2024, Vec::new()).unwrap();
        assert_eq!(store.read_state(2024).unwrap(), Some(Vec::new()));
        assert_eq!(store.state_years().unwrap(), vec![2024]);
    }
}
