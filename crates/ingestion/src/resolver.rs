//! Time-window selection.
//!
//! Decides which entries of a dataset's time axis need publishing, given
//! the table's watermark. Selection is by ingestion timestamp, not by
//! observation time, so windows whose values were revised after being
//! published are picked up again.

use tracing::{debug, info};

use netcdf_parser::ArraySource;
use storage::ImportState;

use crate::error::{IngestionError, Result};

/// Dimension holding the time axis in HYFAA files.
pub const TIME_DIMENSION: &str = "n_time";
/// Observation time of each window (CNES Julian day).
pub const TIME_VARIABLE: &str = "time";
/// When each window was last written by the model (CNES Julian day).
pub const INGESTED_VARIABLE: &str = "time_added_to_hydb";

/// One time window of a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeEntry {
    /// Position along the time axis
    pub index: usize,
    /// Observation time
    pub time_jd: f64,
    /// Time the window's values were last updated in the source
    pub ingested_jd: f64,
}

impl TimeEntry {
    pub fn new(index: usize, time_jd: f64, ingested_jd: f64) -> Self {
        Self {
            index,
            time_jd,
            ingested_jd,
        }
    }
}

/// The windows to publish and the watermark they were selected against.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub work_set: Vec<TimeEntry>,
    /// `last_updated_without_errors_jd` before this run (0 when forced or
    /// never imported)
    pub baseline_jd: f64,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.work_set.is_empty()
    }

    /// Keep only the last `n` windows.
    pub fn truncated(self, n: Option<usize>) -> Self {
        match n {
            Some(n) => Self {
                work_set: truncate_last(self.work_set, n),
                baseline_jd: self.baseline_jd,
            },
            None => self,
        }
    }
}

/// Select the windows to publish.
///
/// Forced runs and tables without a watermark get the whole axis with a
/// zero baseline. Otherwise only windows ingested strictly after
/// `last_updated_without_errors_jd` are kept, in axis order.
pub fn resolve(time_axis: Vec<TimeEntry>, watermark: Option<&ImportState>, force: bool) -> Resolution {
    if force {
        info!(windows = time_axis.len(), "Forcing update on all time values");
        return Resolution {
            work_set: time_axis,
            baseline_jd: 0.0,
        };
    }

    let Some(state) = watermark else {
        info!(
            windows = time_axis.len(),
            "Importing for the first time, publishing every time value"
        );
        return Resolution {
            work_set: time_axis,
            baseline_jd: 0.0,
        };
    };

    let baseline_jd = state.last_updated_without_errors_jd;
    let work_set: Vec<TimeEntry> = time_axis
        .into_iter()
        .filter(|entry| entry.ingested_jd > baseline_jd)
        .collect();

    debug!(
        table = %state.table_name,
        baseline_jd,
        windows = work_set.len(),
        "Selected windows ingested after the watermark"
    );

    Resolution {
        work_set,
        baseline_jd,
    }
}

/// Keep the last `n` entries by axis position, order preserved.
pub fn truncate_last(entries: Vec<TimeEntry>, n: usize) -> Vec<TimeEntry> {
    let skip = entries.len().saturating_sub(n);
    entries.into_iter().skip(skip).collect()
}

/// Smallest and largest observation time of `entries`.
pub fn time_range(entries: &[TimeEntry]) -> Option<(f64, f64)> {
    entries.iter().fold(None, |range, entry| match range {
        None => Some((entry.time_jd, entry.time_jd)),
        Some((lo, hi)) => Some((lo.min(entry.time_jd), hi.max(entry.time_jd))),
    })
}

/// Read the time axis of a HYFAA file.
pub fn read_time_axis(source: &dyn ArraySource) -> Result<Vec<TimeEntry>> {
    let n_time = source.dimension_len(TIME_DIMENSION)?;
    let times = source.read_series(TIME_VARIABLE)?;
    let ingested = source.read_series(INGESTED_VARIABLE)?;

    if times.len() != n_time || ingested.len() != n_time {
        return Err(IngestionError::MissingMetadata(format!(
            "{}: {} has {} values and {} has {}, expected {}",
            source.location(),
            TIME_VARIABLE,
            times.len(),
            INGESTED_VARIABLE,
            ingested.len(),
            n_time
        )));
    }

    times
        .into_iter()
        .zip(ingested)
        .enumerate()
        .map(|(index, (time_jd, ingested_jd))| {
            if time_jd.is_finite() && ingested_jd.is_finite() {
                Ok(TimeEntry::new(index, time_jd, ingested_jd))
            } else {
                Err(IngestionError::InvalidTime(format!(
                    "{}: non-finite time at index {}",
                    source.location(),
                    index
                )))
            }
        })
        .collect()
}
