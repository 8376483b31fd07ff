//! Import watermarks (`sagui_importstate`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use hydro_common::{jd_to_datetime, HydroError, HydroResult};

/// Watermark of one destination table.
///
/// `last_updated_jd` is the latest observation time published (whether or
/// not the run had errors). `last_updated_without_errors_jd` is the
/// ingestion timestamp up to which every window is known to be published;
/// the next run re-selects everything ingested after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportState {
    pub table_name: String,
    pub last_updated: DateTime<Utc>,
    pub last_updated_jd: f64,
    pub update_errors: u32,
    pub last_updated_without_errors: DateTime<Utc>,
    pub last_updated_without_errors_jd: f64,
}

impl ImportState {
    /// Build a record from day counts, deriving the readable timestamps.
    pub fn from_day_counts(
        table_name: impl Into<String>,
        last_updated_jd: f64,
        last_updated_without_errors_jd: f64,
        update_errors: u32,
    ) -> HydroResult<Self> {
        let to_datetime = |jd: f64| {
            jd_to_datetime(jd).ok_or_else(|| HydroError::InvalidTime(format!("{} days", jd)))
        };

        Ok(Self {
            table_name: table_name.into(),
            last_updated: to_datetime(last_updated_jd)?,
            last_updated_jd,
            update_errors,
            last_updated_without_errors: to_datetime(last_updated_without_errors_jd)?,
            last_updated_without_errors_jd,
        })
    }
}

/// Persistence of import watermarks, one record per destination table.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Watermark of `table_name`, `None` if it was never imported.
    async fn load_state(&self, table_name: &str) -> HydroResult<Option<ImportState>>;

    /// Create or atomically replace the watermark of `state.table_name`.
    async fn save_state(&self, state: &ImportState) -> HydroResult<()>;

    /// Every stored watermark, ordered by table name.
    async fn list_states(&self) -> HydroResult<Vec<ImportState>>;
}

/// Internal row type for database queries.
#[derive(FromRow)]
pub(crate) struct ImportStateRow {
    tablename: String,
    last_updated: DateTime<Utc>,
    last_updated_jd: f64,
    update_errors: i16,
    last_updated_without_errors: DateTime<Utc>,
    last_updated_without_errors_jd: f64,
}

impl From<ImportStateRow> for ImportState {
    fn from(row: ImportStateRow) -> Self {
        ImportState {
            table_name: row.tablename,
            last_updated: row.last_updated,
            last_updated_jd: row.last_updated_jd,
            update_errors: row.update_errors.max(0) as u32,
            last_updated_without_errors: row.last_updated_without_errors,
            last_updated_without_errors_jd: row.last_updated_without_errors_jd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_day_counts() {
        let state = ImportState::from_day_counts("hyfaa_data_forecast", 2.0, 1.5, 0).unwrap();
        assert_eq!(
            state.last_updated,
            Utc.with_ymd_and_hms(1950, 1, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            state.last_updated_without_errors,
            Utc.with_ymd_and_hms(1950, 1, 2, 12, 0, 0).unwrap()
        );
        assert_eq!(state.update_errors, 0);
    }

    #[test]
    fn test_from_day_counts_rejects_nan() {
        assert!(ImportState::from_day_counts("t", f64::NAN, 0.0, 0).is_err());
    }
}
