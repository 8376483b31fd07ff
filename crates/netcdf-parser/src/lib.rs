//! NetCDF reader for HYFAA-MGB model outputs.
//!
//! HYFAA post-processing files are NetCDF-4 containers with two dimensions,
//! `n_time` and `n_cells` (rainfall forcing files use `n_meshes`), and
//! variables laid out either along time (`time`, `time_added_to_hydb`,
//! `is_analysis`) or as `[time, cell]` matrices (`streamflow_catchment_mean`,
//! ...).
//!
//! The import pipeline only needs named, index-addressed access to those
//! variables, so it is written against the [`ArraySource`] trait rather than
//! the `netcdf` crate directly. [`open`] returns the native implementation
//! when the crate is built with the `native` feature (the default).

pub mod error;
#[cfg(feature = "native")]
pub mod native;

use std::path::Path;

pub use error::{NetCdfError, NetCdfResult};
#[cfg(feature = "native")]
pub use native::{silence_hdf5_errors, NetCdfSource};

/// Read access to a self-describing array container.
///
/// Values are widened to `f64`. Methods returning `Option<f64>` map fill
/// values and NaN to `None`.
pub trait ArraySource {
    /// Human-readable location of the source (path), for log context.
    fn location(&self) -> &str;

    /// Length of a named dimension.
    fn dimension_len(&self, name: &str) -> NetCdfResult<usize>;

    /// Every value of a 1-D variable.
    fn read_series(&self, variable: &str) -> NetCdfResult<Vec<f64>>;

    /// Every value of a 1-D variable, fill values as `None`.
    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<Option<f64>>>;

    /// One row of a 2-D `[time, cell]` variable, fill values as `None`.
    fn read_row(&self, variable: &str, index: usize) -> NetCdfResult<Vec<Option<f64>>>;

    /// The value at `index` of a 1-D variable.
    fn read_at(&self, variable: &str, index: usize) -> NetCdfResult<f64> {
        let series = self.read_series(variable)?;
        series
            .get(index)
            .copied()
            .ok_or_else(|| NetCdfError::IndexOutOfRange {
                variable: variable.to_string(),
                index,
                len: series.len(),
            })
    }
}

/// Open a NetCDF file for reading.
#[cfg(feature = "native")]
pub fn open(path: &Path) -> NetCdfResult<Box<dyn ArraySource>> {
    Ok(Box::new(NetCdfSource::open(path)?))
}

/// Open a NetCDF file for reading.
#[cfg(not(feature = "native"))]
pub fn open(path: &Path) -> NetCdfResult<Box<dyn ArraySource>> {
    Err(NetCdfError::Unsupported(format!(
        "cannot read {}: built without the `native` feature",
        path.display()
    )))
}

/// Map a raw value to `None` when it is NaN or equals the fill value.
pub fn mask_fill(value: f64, fill_value: Option<f64>) -> Option<f64> {
    if value.is_nan() {
        return None;
    }
    match fill_value {
        Some(fill) if value == fill => None,
        _ => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f64>);

    impl ArraySource for Fixed {
        fn location(&self) -> &str {
            "fixed"
        }

        fn dimension_len(&self, _name: &str) -> NetCdfResult<usize> {
            Ok(self.0.len())
        }

        fn read_series(&self, _variable: &str) -> NetCdfResult<Vec<f64>> {
            Ok(self.0.clone())
        }

        fn read_values(&self, _variable: &str) -> NetCdfResult<Vec<Option<f64>>> {
            Ok(self.0.iter().map(|&v| Some(v)).collect())
        }

        fn read_row(&self, variable: &str, _index: usize) -> NetCdfResult<Vec<Option<f64>>> {
            self.read_values(variable)
        }
    }

    #[test]
    fn test_read_at_default() {
        let source = Fixed(vec![1.0, 2.0, 3.0]);
        assert_eq!(source.read_at("time", 2).unwrap(), 3.0);
        match source.read_at("time", 3) {
            Err(NetCdfError::IndexOutOfRange { index, len, .. }) => {
                assert_eq!(index, 3);
                assert_eq!(len, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn test_open_without_native_reader() {
        let result = open(Path::new("post_processing_portal.nc"));
        assert!(matches!(result, Err(NetCdfError::Unsupported(_))));
    }

    #[test]
    fn test_mask_fill() {
        assert_eq!(mask_fill(1.5, None), Some(1.5));
        assert_eq!(mask_fill(-9999.0, Some(-9999.0)), None);
        assert_eq!(mask_fill(f64::NAN, None), None);
        assert_eq!(mask_fill(0.0, Some(-9999.0)), Some(0.0));
    }
}
