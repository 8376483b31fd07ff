//! Error types shared by the HYFAA import crates.

use thiserror::Error;

/// Result type alias using HydroError.
pub type HydroResult<T> = Result<T, HydroError>;

/// Primary error type for storage and configuration operations.
#[derive(Debug, Error)]
pub enum HydroError {
    // === Configuration Errors ===
    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    #[error("Invalid value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    // === Data Errors ===
    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    // === Storage Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl HydroError {
    /// Whether the error comes from the destination database rather than
    /// from configuration or input data.
    pub fn is_database(&self) -> bool {
        matches!(self, HydroError::DatabaseError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_database() {
        assert!(HydroError::DatabaseError("boom".into()).is_database());
        assert!(!HydroError::MissingSetting("rootpath".into()).is_database());
    }

    #[test]
    fn test_display_invalid_parameter() {
        let err = HydroError::InvalidParameter {
            param: "commit_page_size".into(),
            message: "must be >= 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for 'commit_page_size': must be >= 1"
        );
    }
}
