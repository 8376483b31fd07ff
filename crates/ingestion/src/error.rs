//! Error types for the ingestion crate.

use thiserror::Error;

use hydro_common::HydroError;
use netcdf_parser::NetCdfError;

/// Errors that can occur during an import run.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read source data: {0}")]
    Source(#[from] NetCdfError),

    #[error("Storage error: {0}")]
    Storage(#[from] HydroError),

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    #[error("Source has {0} cells, more than a cell id can address")]
    TooManyCells(usize),
}

impl IngestionError {
    /// Whether the error is a configuration problem, detected before any
    /// source or database access.
    pub fn is_config(&self) -> bool {
        matches!(self, IngestionError::InvalidConfig(_))
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
