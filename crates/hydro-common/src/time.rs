//! Time handling for HYFAA day counts.
//!
//! HYFAA-MGB outputs store every time value as a CNES Julian day: a
//! floating-point number of days since 1950-01-01T00:00:00Z. Both the
//! observation time axis and the "added to database" timestamps use it.

use chrono::{DateTime, NaiveDate, Utc};

/// Unix timestamp (seconds) of the CNES epoch, 1950-01-01T00:00:00Z.
pub const CNES_EPOCH_UNIX_SECONDS: i64 = -631_152_000;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert a CNES Julian day to a UTC datetime, keeping the fractional day.
///
/// Returns `None` for non-finite values or values outside chrono's range.
pub fn jd_to_datetime(jd: f64) -> Option<DateTime<Utc>> {
    if !jd.is_finite() {
        return None;
    }
    let offset_micros = (jd * MICROS_PER_DAY).round();
    if offset_micros.abs() > i64::MAX as f64 / 2.0 {
        return None;
    }
    let total = CNES_EPOCH_UNIX_SECONDS * MICROS_PER_SECOND + offset_micros as i64;
    let secs = total.div_euclid(MICROS_PER_SECOND);
    let nanos = (total.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Convert a CNES Julian day to a calendar date, discarding the fractional
/// part of the day (floor, so negative values round towards the past).
pub fn jd_to_date(jd: f64) -> Option<NaiveDate> {
    jd_to_datetime(jd.floor()).map(|dt| dt.date_naive())
}

/// Convert a UTC datetime to a CNES Julian day.
pub fn datetime_to_jd(dt: DateTime<Utc>) -> f64 {
    let micros = dt.timestamp_micros() - CNES_EPOCH_UNIX_SECONDS * MICROS_PER_SECOND;
    micros as f64 / MICROS_PER_DAY
}
