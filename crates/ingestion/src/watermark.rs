//! Watermark bookkeeping.
//!
//! Each destination table has one `ImportState` record. After a dataset run
//! the record is replaced in a single upsert:
//!
//! - `last_updated_jd` becomes the latest observation time attempted, and
//!   never moves backwards.
//! - `last_updated_without_errors_jd` becomes the latest ingestion
//!   timestamp of the work set when every page was written, and stays at
//!   the pre-run baseline otherwise, so the next run selects the same
//!   windows again.
//!
//! Forecast windows have observation times in the future, so
//! `last_updated_jd` may be ahead of `last_updated_without_errors_jd`
//! and the two are not compared.

use std::fmt;

use tracing::{info, warn};

use storage::{ImportState, StateStore};

use crate::error::Result;
use crate::resolver::TimeEntry;

/// Where a table stands relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkStatus {
    /// No watermark record exists
    NeverImported,
    /// No window was ingested after the watermark
    UpToDate,
    /// `pending` windows were ingested after the watermark
    HasPendingWork { pending: usize },
}

impl fmt::Display for WatermarkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatermarkStatus::NeverImported => write!(f, "never imported"),
            WatermarkStatus::UpToDate => write!(f, "up to date"),
            WatermarkStatus::HasPendingWork { pending } => write!(f, "{} pending windows", pending),
        }
    }
}

/// Classify a table against its current time axis.
pub fn classify(watermark: Option<&ImportState>, axis: &[TimeEntry]) -> WatermarkStatus {
    let Some(state) = watermark else {
        return WatermarkStatus::NeverImported;
    };
    let pending = axis
        .iter()
        .filter(|e| e.ingested_jd > state.last_updated_without_errors_jd)
        .count();
    if pending == 0 {
        WatermarkStatus::UpToDate
    } else {
        WatermarkStatus::HasPendingWork { pending }
    }
}

/// Compute the record to store after a run, `None` for an empty work set.
pub fn next_state(
    table: &str,
    previous: Option<&ImportState>,
    work_set: &[TimeEntry],
    errors: u32,
    baseline_jd: f64,
) -> Result<Option<ImportState>> {
    let Some(max_time_jd) = work_set.iter().map(|e| e.time_jd).reduce(f64::max) else {
        return Ok(None);
    };

    let last_updated_jd = match previous {
        Some(state) => max_time_jd.max(state.last_updated_jd),
        None => max_time_jd,
    };

    let last_updated_without_errors_jd = if errors > 0 {
        baseline_jd
    } else {
        work_set
            .iter()
            .map(|e| e.ingested_jd)
            .fold(baseline_jd, f64::max)
    };

    Ok(Some(ImportState::from_day_counts(
        table,
        last_updated_jd,
        last_updated_without_errors_jd,
        errors,
    )?))
}

/// Store the outcome of a run for `table`.
///
/// Called once per dataset run, after every page was flushed. Returns the
/// stored record, or `None` when the work set was empty and nothing was
/// written.
pub async fn record_outcome(
    store: &dyn StateStore,
    table: &str,
    work_set: &[TimeEntry],
    errors: u32,
    baseline_jd: f64,
) -> Result<Option<ImportState>> {
    if work_set.is_empty() {
        return Ok(None);
    }

    let previous = store.load_state(table).await?;
    let Some(state) = next_state(table, previous.as_ref(), work_set, errors, baseline_jd)? else {
        return Ok(None);
    };

    store.save_state(&state).await?;

    if errors > 0 {
        warn!(
            table,
            errors,
            last_updated_jd = state.last_updated_jd,
            last_updated_without_errors_jd = state.last_updated_without_errors_jd,
            "Watermark held at baseline after errors"
        );
    } else {
        info!(
            table,
            last_updated_jd = state.last_updated_jd,
            last_updated_without_errors_jd = state.last_updated_without_errors_jd,
            "Watermark advanced"
        );
    }

    Ok(Some(state))
}
