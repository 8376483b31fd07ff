//! Native NetCDF reading using the netcdf library.
//!
//! The netcdf library wraps libnetcdf/HDF5 and needs a file path. HYFAA
//! files are read in place: the time axis and one `[time, cell]` row per
//! time window, so memory use stays proportional to the number of cells.

use std::path::Path;
use std::sync::Once;

use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::{mask_fill, ArraySource};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose diagnostics to stderr even when errors
/// are handled by the Rust code (e.g. when probing for an optional
/// `_FillValue` attribute). This disables that output by calling
/// H5Eset_auto2 with null handlers. Safe to call more than once; call it
/// before the first file is opened.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// A NetCDF file opened read-only.
pub struct NetCdfSource {
    file: netcdf::File,
    location: String,
}

impl NetCdfSource {
    /// Open a NetCDF file read-only.
    pub fn open(path: &Path) -> NetCdfResult<Self> {
        silence_hdf5_errors();

        if !path.exists() {
            return Err(NetCdfError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let file = netcdf::open(path).map_err(|e| {
            NetCdfError::InvalidFormat(format!("Failed to open {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Opened NetCDF file");

        Ok(Self {
            file,
            location: path.display().to_string(),
        })
    }

    fn variable(&self, name: &str) -> NetCdfResult<netcdf::Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable in {}", name, self.location)))
    }
}

impl ArraySource for NetCdfSource {
    fn location(&self) -> &str {
        &self.location
    }

    fn dimension_len(&self, name: &str) -> NetCdfResult<usize> {
        self.file
            .dimension(name)
            .map(|dim| dim.len())
            .ok_or_else(|| NetCdfError::MissingData(format!("{} dimension in {}", name, self.location)))
    }

    fn read_series(&self, variable: &str) -> NetCdfResult<Vec<f64>> {
        let var = self.variable(variable)?;
        expect_rank(&var, variable, 1)?;
        var.get_values::<f64, _>(..)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", variable, e)))
    }

    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<Option<f64>>> {
        let var = self.variable(variable)?;
        let fill_value = get_fill_value(&var);
        let raw = self.read_series(variable)?;
        Ok(raw.into_iter().map(|v| mask_fill(v, fill_value)).collect())
    }

    fn read_row(&self, variable: &str, index: usize) -> NetCdfResult<Vec<Option<f64>>> {
        let var = self.variable(variable)?;
        expect_rank(&var, variable, 2)?;

        let dims = var.dimensions();
        let n_time = dims[0].len();
        let n_cells = dims[1].len();
        if index >= n_time {
            return Err(NetCdfError::IndexOutOfRange {
                variable: variable.to_string(),
                index,
                len: n_time,
            });
        }

        let fill_value = get_fill_value(&var);
        let raw: Vec<f64> = var
            .get_values::<f64, _>([index..index + 1, 0..n_cells])
            .map_err(|e| {
                NetCdfError::InvalidFormat(format!("Failed to read {}[{}]: {}", variable, index, e))
            })?;

        if raw.len() != n_cells {
            return Err(NetCdfError::InvalidFormat(format!(
                "{}[{}] returned {} values, expected {}",
                variable,
                index,
                raw.len(),
                n_cells
            )));
        }

        Ok(raw.into_iter().map(|v| mask_fill(v, fill_value)).collect())
    }

    fn read_at(&self, variable: &str, index: usize) -> NetCdfResult<f64> {
        let var = self.variable(variable)?;
        expect_rank(&var, variable, 1)?;

        let len = var.dimensions()[0].len();
        if index >= len {
            return Err(NetCdfError::IndexOutOfRange {
                variable: variable.to_string(),
                index,
                len,
            });
        }

        let values: Vec<f64> = var
            .get_values::<f64, _>([index..index + 1])
            .map_err(|e| {
                NetCdfError::InvalidFormat(format!("Failed to read {}[{}]: {}", variable, index, e))
            })?;
        values
            .first()
            .copied()
            .ok_or_else(|| NetCdfError::MissingData(format!("{}[{}]", variable, index)))
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

fn expect_rank(var: &netcdf::Variable, name: &str, rank: usize) -> NetCdfResult<()> {
    let actual = var.dimensions().len();
    if actual != rank {
        return Err(NetCdfError::InvalidFormat(format!(
            "{} has {} dimensions, expected {}",
            name, actual, rank
        )));
    }
    Ok(())
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Helper to get f64 attribute.
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

/// `_FillValue`, falling back to the older `missing_value` convention.
fn get_fill_value(var: &netcdf::Variable) -> Option<f64> {
    get_f64_attr(var, "_FillValue").or_else(|| get_f64_attr(var, "missing_value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let result = NetCdfSource::open(Path::new("/nonexistent/post_processing_portal.nc"));
        assert!(matches!(result, Err(NetCdfError::IoError(_))));
    }

    #[test]
    fn test_silence_is_idempotent() {
        silence_hdf5_errors();
        silence_hdf5_errors();
    }
}
