//! Batch upsert with a declared conflict key.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use hydro_common::{HydroError, HydroResult};

use crate::ident::SqlIdent;

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// A single typed value of an upserted row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    SmallInt(i16),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Bool(bool),
    Float(Option<f64>),
}

/// Destination of a batch upsert: table, column order and conflict key.
///
/// On conflict every column outside the key is overwritten with the
/// incoming value (last write wins, no field-level merge).
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertTarget {
    table: SqlIdent,
    columns: Vec<SqlIdent>,
    conflict: Vec<SqlIdent>,
}

impl UpsertTarget {
    /// Declare a target. `conflict` must be a non-empty subset of `columns`.
    pub fn new(table: SqlIdent, columns: Vec<SqlIdent>, conflict: Vec<SqlIdent>) -> HydroResult<Self> {
        if columns.is_empty() {
            return Err(invalid(&table, "no columns declared"));
        }
        if conflict.is_empty() {
            return Err(invalid(&table, "no conflict key declared"));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(invalid(&table, &format!("duplicate column {}", column)));
            }
        }
        if let Some(missing) = conflict.iter().find(|c| !columns.contains(c)) {
            return Err(invalid(
                &table,
                &format!("conflict column {} is not an inserted column", missing),
            ));
        }

        Ok(Self {
            table,
            columns,
            conflict,
        })
    }

    pub fn table(&self) -> &SqlIdent {
        &self.table
    }

    pub fn columns(&self) -> &[SqlIdent] {
        &self.columns
    }

    /// Columns overwritten on conflict.
    pub fn update_columns(&self) -> impl Iterator<Item = &SqlIdent> {
        self.columns.iter().filter(|c| !self.conflict.contains(c))
    }

    /// Positions of the conflict columns within a row.
    pub fn conflict_positions(&self) -> Vec<usize> {
        self.conflict
            .iter()
            .filter_map(|key| self.columns.iter().position(|c| c == key))
            .collect()
    }

    /// Rows that fit in one statement without exceeding the bind limit.
    pub fn rows_per_statement(&self) -> usize {
        (MAX_BIND_PARAMS / self.columns.len()).max(1)
    }

    /// Reject rows whose width does not match the declared columns.
    pub fn check_rows(&self, rows: &[Vec<CellValue>]) -> HydroResult<()> {
        match rows.iter().position(|row| row.len() != self.columns.len()) {
            Some(i) => Err(invalid(
                &self.table,
                &format!(
                    "row {} has {} values, expected {}",
                    i,
                    rows[i].len(),
                    self.columns.len()
                ),
            )),
            None => Ok(()),
        }
    }

    /// Drop rows whose conflict key repeats a later row's key.
    ///
    /// A single `INSERT ... ON CONFLICT DO UPDATE` may not touch the same
    /// row twice, so a batch keeps only the last row per key. Surviving
    /// rows stay in their original order.
    pub fn dedup_rows<'r>(&self, rows: &'r [Vec<CellValue>]) -> Vec<&'r Vec<CellValue>> {
        let positions = self.conflict_positions();
        let mut last_seen: HashMap<Vec<KeyPart>, usize> = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let key = positions.iter().filter_map(|&p| row.get(p)).map(KeyPart::from).collect();
            last_seen.insert(key, i);
        }

        if last_seen.len() == rows.len() {
            return rows.iter().collect();
        }
        let mut keep: Vec<usize> = last_seen.into_values().collect();
        keep.sort_unstable();
        keep.into_iter().map(|i| &rows[i]).collect()
    }

    /// `INSERT INTO schema.table (cols) ` prefix, values appended by the caller.
    pub fn insert_prefix(&self, schema: &SqlIdent) -> String {
        format!(
            "INSERT INTO {}.{} ({}) ",
            schema,
            self.table,
            join(self.columns.iter())
        )
    }

    /// ` ON CONFLICT (key) DO UPDATE SET col = EXCLUDED.col, ...` suffix.
    pub fn conflict_clause(&self) -> String {
        let updates: Vec<String> = self
            .update_columns()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();

        if updates.is_empty() {
            format!(" ON CONFLICT ({}) DO NOTHING", join(self.conflict.iter()))
        } else {
            format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                join(self.conflict.iter()),
                updates.join(", ")
            )
        }
    }
}

/// Hashable projection of a key value.
#[derive(PartialEq, Eq, Hash)]
enum KeyPart {
    SmallInt(i16),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Bool(bool),
    Float(Option<u64>),
}

impl From<&CellValue> for KeyPart {
    fn from(value: &CellValue) -> Self {
        match *value {
            CellValue::SmallInt(v) => KeyPart::SmallInt(v),
            CellValue::Date(v) => KeyPart::Date(v),
            CellValue::Timestamp(v) => KeyPart::Timestamp(v),
            CellValue::Bool(v) => KeyPart::Bool(v),
            CellValue::Float(v) => KeyPart::Float(v.map(f64::to_bits)),
        }
    }
}

fn join<'a>(idents: impl Iterator<Item = &'a SqlIdent>) -> String {
    idents.map(SqlIdent::as_str).collect::<Vec<_>>().join(", ")
}

fn invalid(table: &SqlIdent, message: &str) -> HydroError {
    HydroError::InvalidParameter {
        param: format!("upsert target {}", table),
        message: message.to_string(),
    }
}

/// Something that can apply a batch upsert atomically.
#[async_trait]
pub trait UpsertSink: Send + Sync {
    /// Upsert every row in a single transaction. Either all rows are
    /// written or none are. Returns the number of rows affected.
    async fn upsert(&self, target: &UpsertTarget, rows: &[Vec<CellValue>]) -> HydroResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> SqlIdent {
        SqlIdent::new(s).unwrap()
    }

    fn rainfall_target() -> UpsertTarget {
        UpsertTarget::new(
            ident("sagui_rainfall"),
            vec![ident("cell_id"), ident("date"), ident("rain")],
            vec![ident("cell_id"), ident("date")],
        )
        .unwrap()
    }

    #[test]
    fn test_sql_fragments() {
        let target = rainfall_target();
        assert_eq!(
            target.insert_prefix(&ident("hyfaa")),
            "INSERT INTO hyfaa.sagui_rainfall (cell_id, date, rain) "
        );
        assert_eq!(
            target.conflict_clause(),
            " ON CONFLICT (cell_id, date) DO UPDATE SET rain = EXCLUDED.rain"
        );
    }

    #[test]
    fn test_key_only_target_does_nothing_on_conflict() {
        let target = UpsertTarget::new(
            ident("t"),
            vec![ident("cell_id"), ident("date")],
            vec![ident("cell_id"), ident("date")],
        )
        .unwrap();
        assert_eq!(target.conflict_clause(), " ON CONFLICT (cell_id, date) DO NOTHING");
    }

    #[test]
    fn test_conflict_must_be_inserted() {
        let result = UpsertTarget::new(
            ident("t"),
            vec![ident("cell_id"), ident("rain")],
            vec![ident("cell_id"), ident("date")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = UpsertTarget::new(
            ident("t"),
            vec![ident("cell_id"), ident("cell_id")],
            vec![ident("cell_id")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_check_rows_width() {
        let target = rainfall_target();
        let date = NaiveDate::from_ymd_opt(2022, 6, 27).unwrap();
        let good = vec![vec![
            CellValue::SmallInt(1),
            CellValue::Date(date),
            CellValue::Float(Some(2.5)),
        ]];
        assert!(target.check_rows(&good).is_ok());

        let bad = vec![vec![CellValue::SmallInt(1), CellValue::Date(date)]];
        assert!(target.check_rows(&bad).is_err());
    }

    #[test]
    fn test_dedup_rows_keeps_last_per_key() {
        let target = rainfall_target();
        let day1 = NaiveDate::from_ymd_opt(2022, 6, 27).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2022, 6, 28).unwrap();
        let row = |cell, date, rain| {
            vec![
                CellValue::SmallInt(cell),
                CellValue::Date(date),
                CellValue::Float(Some(rain)),
            ]
        };
        let rows = vec![row(1, day1, 1.0), row(2, day1, 2.0), row(1, day1, 3.0), row(1, day2, 4.0)];

        let kept = target.dedup_rows(&rows);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0], &row(2, day1, 2.0));
        assert_eq!(kept[1], &row(1, day1, 3.0));
        assert_eq!(kept[2], &row(1, day2, 4.0));
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rainfall_target().rows_per_statement(), 21_845);
        assert_eq!(rainfall_target().conflict_positions(), vec![0, 1]);
    }
}
