//! In-memory store with failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use hydro_common::{HydroError, HydroResult};
use storage::{
    CellValue, ImportState, SaguiConfig, SettingsStore, StateStore, UpsertSink, UpsertTarget,
};

type Table = HashMap<String, Vec<CellValue>>;

/// Implements every storage trait in memory.
///
/// Upserts are atomic per call: a failing call writes nothing. Failures are
/// injected by call number (1-based, counted across all tables).
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    states: Mutex<HashMap<String, ImportState>>,
    config: Mutex<Option<SaguiConfig>>,
    minibasins: Mutex<Vec<(i16, i16)>>,
    failing_upserts: Mutex<HashSet<usize>>,
    upsert_calls: AtomicUsize,
    state_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `call`-th upsert (1-based) fail.
    pub fn fail_upsert_call(&self, call: usize) {
        self.failing_upserts.lock().unwrap().insert(call);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.failing_upserts.lock().unwrap().clear();
    }

    pub fn set_config(&self, config: Option<SaguiConfig>) {
        *self.config.lock().unwrap() = config;
    }

    /// Register minibasins as `(mini, ordem)` pairs.
    pub fn set_minibasins(&self, minibasins: Vec<(i16, i16)>) {
        *self.minibasins.lock().unwrap() = minibasins;
    }

    pub fn put_state(&self, state: ImportState) {
        self.states
            .lock()
            .unwrap()
            .insert(state.table_name.clone(), state);
    }

    pub fn state(&self, table: &str) -> Option<ImportState> {
        self.states.lock().unwrap().get(table).cloned()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn state_saves(&self) -> usize {
        self.state_saves.load(Ordering::SeqCst)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    /// Stored row of a table keyed by `(cell_id, date)`.
    pub fn row(&self, table: &str, cell_id: i16, date: NaiveDate) -> Option<Vec<CellValue>> {
        let key = row_key(&[CellValue::SmallInt(cell_id), CellValue::Date(date)]);
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.get(&key).cloned())
    }

    /// Sorted distinct cell ids stored in a table.
    pub fn cell_ids(&self, table: &str) -> Vec<i16> {
        let tables = self.tables.lock().unwrap();
        let mut ids: Vec<i16> = tables
            .get(table)
            .into_iter()
            .flat_map(|rows| rows.values())
            .filter_map(|row| match row.first() {
                Some(CellValue::SmallInt(id)) => Some(*id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Sorted distinct dates stored in a table.
    pub fn dates(&self, table: &str) -> Vec<NaiveDate> {
        let tables = self.tables.lock().unwrap();
        let mut dates: Vec<NaiveDate> = tables
            .get(table)
            .into_iter()
            .flat_map(|rows| rows.values())
            .filter_map(|row| match row.get(1) {
                Some(CellValue::Date(date)) => Some(*date),
                _ => None,
            })
            .collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }
}

fn row_key(values: &[CellValue]) -> String {
    format!("{:?}", values)
}

#[async_trait]
impl UpsertSink for MemoryStore {
    async fn upsert(&self, target: &UpsertTarget, rows: &[Vec<CellValue>]) -> HydroResult<u64> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        target.check_rows(rows)?;
        if self.failing_upserts.lock().unwrap().contains(&call) {
            return Err(HydroError::DatabaseError(format!(
                "injected failure on upsert call {}",
                call
            )));
        }

        let positions = target.conflict_positions();
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(target.table().to_string()).or_default();
        for row in rows {
            let key: Vec<CellValue> = positions.iter().map(|&p| row[p]).collect();
            table.insert(row_key(&key), row.clone());
        }
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_state(&self, table_name: &str) -> HydroResult<Option<ImportState>> {
        Ok(self.state(table_name))
    }

    async fn save_state(&self, state: &ImportState) -> HydroResult<()> {
        self.state_saves.fetch_add(1, Ordering::SeqCst);
        self.put_state(state.clone());
        Ok(())
    }

    async fn list_states(&self) -> HydroResult<Vec<ImportState>> {
        let mut states: Vec<ImportState> = self.states.lock().unwrap().values().cloned().collect();
        states.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(states)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_config(&self) -> HydroResult<Option<SaguiConfig>> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn minibasins_with_min_ordem(&self, min_ordem: i16) -> HydroResult<Vec<i16>> {
        let mut minis: Vec<i16> = self
            .minibasins
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, ordem)| *ordem >= min_ordem)
            .map(|(mini, _)| *mini)
            .collect();
        minis.sort_unstable();
        Ok(minis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::SqlIdent;

    fn target() -> UpsertTarget {
        let ident = |s: &str| SqlIdent::new(s).unwrap();
        UpsertTarget::new(
            ident("sagui_rainfall"),
            vec![ident("cell_id"), ident("date"), ident("rain")],
            vec![ident("cell_id"), ident("date")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_fails_on_demand() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2022, 6, 27).unwrap();
        let row = |rain| vec![CellValue::SmallInt(1), CellValue::Date(date), CellValue::Float(Some(rain))];

        store.upsert(&target(), &[row(1.0)]).await.unwrap();
        store.upsert(&target(), &[row(2.0)]).await.unwrap();
        assert_eq!(store.row_count("sagui_rainfall"), 1);
        assert_eq!(store.row("sagui_rainfall", 1, date), Some(row(2.0)));

        store.fail_upsert_call(3);
        assert!(store.upsert(&target(), &[row(3.0)]).await.is_err());
        assert_eq!(store.row("sagui_rainfall", 1, date), Some(row(2.0)));
        assert_eq!(store.upsert_calls(), 3);
    }

    #[test]
    fn test_minibasins_filtered_by_ordem() {
        let store = MemoryStore::new();
        store.set_minibasins(vec![(3, 10), (1, 12), (2, 5)]);
        let cells = tokio_test::block_on(store.minibasins_with_min_ordem(10)).unwrap();
        assert_eq!(cells, vec![1, 3]);
    }
}
