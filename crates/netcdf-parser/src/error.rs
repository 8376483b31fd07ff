//! Error types for NetCDF reading operations.

use thiserror::Error;

/// Result type for NetCDF parser operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF reading.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable, dimension or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format or unexpected shape
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Index past the end of a dimension
    #[error("Index {index} out of range for '{variable}' (length {len})")]
    IndexOutOfRange {
        variable: String,
        index: usize,
        len: usize,
    },

    /// Built without a reader for this kind of file
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
