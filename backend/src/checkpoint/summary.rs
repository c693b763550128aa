//! Database state summaries
//!
//! A summary is a compact fingerprint of the critical tables: row counts
//! plus a few integer aggregates. It is stored in each checkpoint and
//! re-captured from the live store before resuming; any difference means
//! the store was modified after the checkpoint was written.
//!
//! Only partitions with `year <= through_year` are summarized, so the
//! partial output of a later, crashed year never invalidates an earlier
//! checkpoint.

use crate::models::EventType;
use crate::store::{AnalyticalStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub row_count: u64,
    pub aggregates: BTreeMap<String, i64>,
}

/// Row counts and key aggregates for the critical tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStateSummary {
    pub tables: BTreeMap<String, TableSummary>,
}

impl DatabaseStateSummary {
    /// Human-readable differences between `self` (expected) and `live`.
    pub fn diff(&self, live: &DatabaseStateSummary) -> Vec<String> {
        let mut differences = Vec::new();
        let names: std::collections::BTreeSet<&String> =
            self.tables.keys().chain(live.tables.keys()).collect();

        for name in names {
            match (self.tables.get(name), live.tables.get(name)) {
                (Some(_), None) => differences.push(format!("{name}: table missing")),
                (None, Some(_)) => differences.push(format!("{name}: unexpected table")),
                (Some(expected), Some(actual)) => {
                    if expected.row_count != actual.row_count {
                        differences.push(format!(
                            "{name}: row_count {} != {}",
                            expected.row_count, actual.row_count
                        ));
                    }
                    let keys: std::collections::BTreeSet<&String> = expected
                        .aggregates
                        .keys()
                        .chain(actual.aggregates.keys())
                        .collect();
                    for key in keys {
                        let e = expected.aggregates.get(key);
                        let a = actual.aggregates.get(key);
                        if e != a {
                            differences.push(format!("{name}.{key}: {e:?} != {a:?}"));
                        }
                    }
                }
                (None, None) => {}
            }
        }
        differences
    }
}

/// Summarize the store through `through_year` (inclusive).
pub fn capture_summary(
    store: &dyn AnalyticalStore,
    through_year: i32,
) -> StoreResult<DatabaseStateSummary> {
    let mut tables = BTreeMap::new();

    let mut events = TableSummary::default();
    let mut net_change = 0i64;
    for year in store.event_years()?.into_iter().filter(|y| *y <= through_year) {
        for event in store.read_events(year)? {
            events.row_count += 1;
            *events
                .aggregates
                .entry(format!("count_{}", event.event_type))
                .or_insert(0) += 1;
            net_change += event.event_type.headcount_delta();
        }
    }
    for event_type in EventType::ALL {
        events
            .aggregates
            .entry(format!("count_{event_type}"))
            .or_insert(0);
    }
    events.aggregates.insert("net_headcount_change".to_string(), net_change);
    tables.insert("events".to_string(), events);

    let mut state = TableSummary::default();
    for year in store.state_years()?.into_iter().filter(|y| *y <= through_year) {
        if let Some(rows) = store.read_state(year)? {
            state.row_count += rows.len() as u64;
            state
                .aggregates
                .insert(format!("headcount_{year}"), rows.len() as i64);
            state.aggregates.insert(
                format!("compensation_cents_{year}"),
                rows.iter().map(|r| r.compensation_cents).sum(),
            );
        }
    }
    tables.insert("workforce_state".to_string(), state);

    for table in store.metric_tables()? {
        let mut summary = TableSummary::default();
        let mut value_sum = 0i64;
        for year in store.metric_years(&table)?.into_iter().filter(|y| *y <= through_year) {
            if let Some(metrics) = store.read_metrics(&table, year)? {
                summary.row_count += 1;
                value_sum = metrics.values().fold(value_sum, |acc, v| acc.wrapping_add(*v));
            }
        }
        if summary.row_count > 0 {
            summary.aggregates.insert("value_sum".to_string(), value_sum);
            tables.insert(format!("metrics.{table}"), summary);
        }
    }

    Ok(DatabaseStateSummary { tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityState, Event};
    use crate::store::MemoryStore;

    fn populated() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .write_state(2024, vec![EntityState::from_hire(&Event::hire("A", 2024, 1, 100))])
            .unwrap();
        store
            .write_events(2025, "hires", vec![Event::hire("B", 2025, 1, 200)])
            .unwrap();
        store
            .write_events(2026, "hires", vec![Event::hire("C", 2026, 1, 300)])
            .unwrap();
        store
    }

    #[test]
    fn test_summary_is_scoped_to_year() {
        let store = populated();
        let through_2025 = capture_summary(&store, 2025).unwrap();
        assert_eq!(through_2025.tables["events"].row_count, 1);
        assert_eq!(through_2025.tables["events"].aggregates["count_hire"], 1);
        assert_eq!(through_2025.tables["workforce_state"].aggregates["headcount_2024"], 1);

        let through_2026 = capture_summary(&store, 2026).unwrap();
        assert_eq!(through_2026.tables["events"].row_count, 2);
    }

    #[test]
    fn test_diff_names_changed_aggregates() {
        let store = populated();
        let before = capture_summary(&store, 2025).unwrap();
        store
            .write_events(2025, "terms", vec![Event::termination("A", 2025)])
            .unwrap();
        let after = capture_summary(&store, 2025).unwrap();

        let diff = before.diff(&after);
        assert!(diff.iter().any(|d| d.contains("events: row_count 1 != 2")));
        assert!(diff.iter().any(|d| d.contains("count_termination")));
        assert!(before.diff(&before).is_empty());
    }
}
