//! Common types and utilities shared by the HYFAA import crates.

pub mod dataset;
pub mod error;
pub mod time;

pub use dataset::DatasetKind;
pub use error::{HydroError, HydroResult};
pub use time::{datetime_to_jd, jd_to_date, jd_to_datetime};
