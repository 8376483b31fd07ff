//! HYFAA dataset variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HydroError;

/// Columns written for the deterministic MGB run.
const MGBSTANDARD_COLUMNS: &[&str] = &["elevation_mean", "flow_mean"];

/// Columns written for the ensemble runs (forecast and assimilated).
const ENSEMBLE_COLUMNS: &[&str] = &[
    "elevation_mean",
    "elevation_median",
    "elevation_stddev",
    "elevation_mad",
    "flow_mean",
    "flow_median",
    "flow_stddev",
    "flow_mad",
];

/// One of the HYFAA-MGB output series published to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Deterministic MGB run, no assimilation
    MgbStandard,
    /// Forecast using previous years as forcing
    Forecast,
    /// Ensemble run with data assimilation
    Assimilated,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::MgbStandard,
        DatasetKind::Forecast,
        DatasetKind::Assimilated,
    ];

    /// Short identifier, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::MgbStandard => "mgbstandard",
            DatasetKind::Forecast => "forecast",
            DatasetKind::Assimilated => "assimilated",
        }
    }

    /// Conventional destination table for this variant.
    pub fn default_table(&self) -> &'static str {
        match self {
            DatasetKind::MgbStandard => "hyfaa_data_mgbstandard",
            DatasetKind::Forecast => "hyfaa_data_forecast",
            DatasetKind::Assimilated => "hyfaa_data_assimilated",
        }
    }

    /// Value columns the destination table of this variant provides.
    pub fn value_columns(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::MgbStandard => MGBSTANDARD_COLUMNS,
            DatasetKind::Forecast | DatasetKind::Assimilated => ENSEMBLE_COLUMNS,
        }
    }

    /// Whether `column` is one of this variant's value columns.
    pub fn has_column(&self, column: &str) -> bool {
        self.value_columns().contains(&column)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = HydroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HydroError::UnknownDataset(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dataset_kind() {
        assert_eq!("mgbstandard".parse::<DatasetKind>().unwrap(), DatasetKind::MgbStandard);
        assert_eq!(" Assimilated ".parse::<DatasetKind>().unwrap(), DatasetKind::Assimilated);
        assert!("hindcast".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_value_columns() {
        assert_eq!(DatasetKind::MgbStandard.value_columns().len(), 2);
        assert!(DatasetKind::Forecast.has_column("flow_mad"));
        assert!(!DatasetKind::MgbStandard.has_column("flow_mad"));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DatasetKind::Forecast).unwrap();
        assert_eq!(json, "\"forecast\"");
        let kind: DatasetKind = serde_json::from_str("\"mgbstandard\"").unwrap();
        assert_eq!(kind, DatasetKind::MgbStandard);
    }
}
