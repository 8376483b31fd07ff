//! Metadata extraction from rainfall file names.
//!
//! The rainfall forcing store holds one netCDF file per observation
//! timestamp and per revision, named like
//! `..._DATA_20220627T0000_20220627T104312_1.nc`:
//! the observation timestamp, the time the file was produced (with
//! optional seconds and trailing digits), and a counter.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::path::Path;

/// Information extracted from a rainfall file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RainfallFileInfo {
    /// Time the rainfall was observed
    pub observation_time: DateTime<Utc>,
    /// Time the file was produced
    pub produced_time: DateTime<Utc>,
    /// Revision counter
    pub counter: u32,
}

/// Whether the path has a netCDF extension.
pub fn is_netcdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "nc" | "nc4" | "netcdf"))
        .unwrap_or(false)
}

/// Parse a rainfall file name.
///
/// Returns `None` for names that do not follow the
/// `DATA_<YYYYMMDDTHHMM>_<YYYYMMDDTHHMM[SS]...>_<n>.nc` layout.
pub fn parse_rainfall_filename(filename: &str) -> Option<RainfallFileInfo> {
    let stem = filename.strip_suffix(".nc")?;
    let pos = stem.rfind("DATA_")?;
    let mut parts = stem[pos + 5..].split('_');

    let observation = parts.next()?;
    let produced = parts.next()?;
    let counter = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let observation_time = parse_compact_timestamp(observation, false)?;
    let produced_time = parse_compact_timestamp(produced, true)?;
    if counter.is_empty() || !counter.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let counter: u32 = counter.parse().ok()?;

    Some(RainfallFileInfo {
        observation_time,
        produced_time,
        counter,
    })
}

/// Parse `YYYYMMDDTHHMM`, optionally followed by seconds and further
/// digits when `trailing_digits` is set.
fn parse_compact_timestamp(text: &str, trailing_digits: bool) -> Option<DateTime<Utc>> {
    if text.len() < 13 || !text.is_ascii() || text.as_bytes()[8] != b'T' {
        return None;
    }
    let digits = |range: std::ops::Range<usize>| -> Option<u32> {
        let s = &text[range];
        if s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse().ok()
        } else {
            None
        }
    };

    let year = digits(0..4)? as i32;
    let month = digits(4..6)?;
    let day = digits(6..8)?;
    let hour = digits(9..11)?;
    let minute = digits(11..13)?;

    let rest = &text[13..];
    let second = if rest.is_empty() {
        0
    } else if trailing_digits && rest.bytes().all(|b| b.is_ascii_digit()) {
        if rest.len() >= 2 {
            digits(13..15)?
        } else {
            0
        }
    } else {
        return None;
    };

    let naive_date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive_time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(naive_date, naive_time)))
}
