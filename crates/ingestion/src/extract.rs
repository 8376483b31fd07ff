//! Columnar-to-row reshaping of one time window.
//!
//! A HYFAA file stores each variable as a `[time, cell]` matrix. Publishing
//! needs one row per cell instead, carrying the window's date, its update
//! time and analysis flag, and the value of every configured variable.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use hydro_common::{jd_to_date, jd_to_datetime};
use netcdf_parser::ArraySource;
use storage::CellValue;

use crate::config::DatasetDescriptor;
use crate::error::{IngestionError, Result};
use crate::resolver::TimeEntry;

/// Dimension holding the cells in HYFAA files.
pub const CELL_DIMENSION: &str = "n_cells";
/// Whether a window comes from the analysis (non-zero) or a forecast.
pub const ANALYSIS_VARIABLE: &str = "is_analysis";

/// A row destined for a table keyed by `(cell_id, date)`.
pub trait CellRecord {
    fn cell_id(&self) -> i16;

    /// Values in the column order of the destination's upsert target.
    fn to_row(&self) -> Vec<CellValue>;
}

/// One cell of one time window of a hydrological dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct HydroRecord {
    pub cell_id: i16,
    pub date: NaiveDate,
    pub update_time: DateTime<Utc>,
    pub is_analysis: bool,
    /// One value per configured variable, `None` for fill values
    pub values: Vec<Option<f64>>,
}

impl CellRecord for HydroRecord {
    fn cell_id(&self) -> i16 {
        self.cell_id
    }

    fn to_row(&self) -> Vec<CellValue> {
        let mut row = Vec::with_capacity(4 + self.values.len());
        row.push(CellValue::SmallInt(self.cell_id));
        row.push(CellValue::Date(self.date));
        row.push(CellValue::Timestamp(self.update_time));
        row.push(CellValue::Bool(self.is_analysis));
        row.extend(self.values.iter().map(|v| CellValue::Float(*v)));
        row
    }
}

/// Cell ids `1..=n_cells`, failing when they do not fit a small integer.
pub fn cell_ids(n_cells: usize) -> Result<impl Iterator<Item = i16>> {
    let last = i16::try_from(n_cells).map_err(|_| IngestionError::TooManyCells(n_cells))?;
    Ok(1..=last)
}

/// Reshape the window at `entry.index` into one record per cell.
pub fn extract(
    source: &dyn ArraySource,
    descriptor: &DatasetDescriptor,
    entry: &TimeEntry,
) -> Result<Vec<HydroRecord>> {
    let n_cells = source.dimension_len(CELL_DIMENSION)?;
    let ids = cell_ids(n_cells)?;

    let date = jd_to_date(entry.time_jd).ok_or_else(|| {
        IngestionError::InvalidTime(format!("time {} at index {}", entry.time_jd, entry.index))
    })?;
    let update_time = jd_to_datetime(entry.ingested_jd).ok_or_else(|| {
        IngestionError::InvalidTime(format!(
            "{} {} at index {}",
            crate::resolver::INGESTED_VARIABLE,
            entry.ingested_jd,
            entry.index
        ))
    })?;
    let is_analysis = source.read_at(ANALYSIS_VARIABLE, entry.index)? != 0.0;

    let mut columns = Vec::with_capacity(descriptor.variables.len());
    for mapping in &descriptor.variables {
        let column = source.read_row(&mapping.variable, entry.index)?;
        if column.len() != n_cells {
            return Err(IngestionError::MissingMetadata(format!(
                "{}[{}] has {} cells, expected {}",
                mapping.variable,
                entry.index,
                column.len(),
                n_cells
            )));
        }
        columns.push(column);
    }

    let records: Vec<HydroRecord> = ids
        .enumerate()
        .map(|(i, cell_id)| HydroRecord {
            cell_id,
            date,
            update_time,
            is_analysis,
            values: columns.iter().map(|column| column[i]).collect(),
        })
        .collect();

    debug!(
        table = %descriptor.table,
        index = entry.index,
        %date,
        cells = records.len(),
        "Extracted time window"
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use netcdf_parser::NetCdfError;
    use test_utils::{hyfaa_source, window_value, MemorySource, MGBSTANDARD_VARIABLES, STRUCTURE_YAML};

    use crate::config::StructureConfig;

    const WINDOWS: [(f64, f64); 2] = [(26_000.0, 26_000.5), (26_001.0, 26_001.5)];

    fn mgbstandard() -> DatasetDescriptor {
        let structure = StructureConfig::from_yaml(STRUCTURE_YAML)
            .unwrap()
            .validate()
            .unwrap();
        structure.datasets[0].clone()
    }

    fn source() -> MemorySource {
        hyfaa_source(&WINDOWS, 3, &MGBSTANDARD_VARIABLES)
    }

    fn entry(index: usize) -> TimeEntry {
        TimeEntry::new(index, 26_000.0 + index as f64, 26_000.5 + index as f64)
    }

    #[test]
    fn test_to_row_order() {
        let record = HydroRecord {
            cell_id: 7,
            date: NaiveDate::from_ymd_opt(2021, 3, 9).unwrap(),
            update_time: Utc.with_ymd_and_hms(2021, 3, 10, 6, 0, 0).unwrap(),
            is_analysis: true,
            values: vec![Some(1.5), None],
        };
        let row = record.to_row();
        assert_eq!(row.len(), 6);
        assert_eq!(row[0], CellValue::SmallInt(7));
        assert_eq!(row[3], CellValue::Bool(true));
        assert_eq!(row[5], CellValue::Float(None));
    }

    #[test]
    fn test_extract_window() {
        let records = extract(&source(), &mgbstandard(), &entry(1)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].cell_id, 3);
        assert!(records.iter().all(|r| r.is_analysis));
        assert_eq!(
            records[2].values,
            vec![Some(window_value(0, 1, 3)), Some(window_value(1, 1, 3))]
        );
    }

    #[test]
    fn test_extract_broadcasts_forecast_flag() {
        let source = source().with_series(ANALYSIS_VARIABLE, vec![1.0, 0.0]);
        let records = extract(&source, &mgbstandard(), &entry(1)).unwrap();
        assert!(records.iter().all(|r| !r.is_analysis));
        assert_eq!(records[0].to_row()[3], CellValue::Bool(false));
    }

    #[test]
    fn test_extract_missing_variable() {
        let source = hyfaa_source(&WINDOWS, 3, &MGBSTANDARD_VARIABLES[..1]);
        let err = extract(&source, &mgbstandard(), &entry(0)).unwrap_err();
        assert!(matches!(err, IngestionError::Source(NetCdfError::MissingData(_))));
        assert!(err.to_string().contains(MGBSTANDARD_VARIABLES[1]));
    }

    #[test]
    fn test_extract_index_out_of_range() {
        let source = source().with_series(ANALYSIS_VARIABLE, vec![1.0; 3]);
        let err = extract(&source, &mgbstandard(), &entry(2)).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::Source(NetCdfError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn test_extract_row_of_wrong_width() {
        let source = source().with_matrix(MGBSTANDARD_VARIABLES[1], vec![vec![1.0, 2.0]; 2]);
        let err = extract(&source, &mgbstandard(), &entry(0)).unwrap_err();
        assert!(matches!(err, IngestionError::MissingMetadata(_)));
        assert!(err.to_string().contains("has 2 cells, expected 3"));
    }

    #[test]
    fn test_cell_ids() {
        assert_eq!(cell_ids(3).unwrap().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(cell_ids(0).unwrap().count(), 0);
        assert_eq!(cell_ids(32_767).unwrap().last(), Some(i16::MAX));
        assert!(matches!(cell_ids(32_768), Err(IngestionError::TooManyCells(32_768))));
    }
}
