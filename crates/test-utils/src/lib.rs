//! Shared test utilities for the hyfaa-ingest workspace.
//!
//! This crate provides common testing infrastructure including:
//! - An in-memory [`ArraySource`](netcdf_parser::ArraySource)
//! - An in-memory store implementing every storage trait, with failure
//!   injection
//! - Synthetic HYFAA and rainfall fixtures
//! - Test data path helpers and skip macros for optional sample files

pub mod fixtures;
pub mod memory;
pub mod paths;
pub mod store;

pub use fixtures::*;
pub use memory::MemorySource;
pub use paths::*;
pub use store::MemoryStore;

/// Path of a sample file, or an early `return` from the calling test when
/// the file is not available.
///
/// ```ignore
/// let path = require_test_file!("post_processing_portal.nc");
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        let name = $name;
        match $crate::find_test_file(name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "skipping: sample file {} not found (set {} to its directory)",
                    name,
                    $crate::SAMPLE_DIR_VAR
                );
                return;
            }
        }
    }};
}

/// Assert that two numbers differ by at most `epsilon`.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        let diff = (left - right).abs();
        assert!(
            diff <= epsilon,
            "assertion failed: `{} ≈ {}` (diff {} > {})",
            left,
            right,
            diff,
            epsilon
        );
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(26_475.4166, 26_475.4167, 0.001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }
}
