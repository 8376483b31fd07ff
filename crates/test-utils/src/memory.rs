//! In-memory array source.

use std::collections::HashMap;

use netcdf_parser::{mask_fill, ArraySource, NetCdfError, NetCdfResult};

/// An [`ArraySource`] backed by vectors, laid out like a netCDF file:
/// named dimensions, 1-D series and 2-D `[time, cell]` matrices.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    location: String,
    dimensions: HashMap<String, usize>,
    series: HashMap<String, Vec<f64>>,
    matrices: HashMap<String, Vec<Vec<f64>>>,
    fill_values: HashMap<String, f64>,
}

impl MemorySource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_dimension(mut self, name: &str, len: usize) -> Self {
        self.dimensions.insert(name.to_string(), len);
        self
    }

    pub fn with_series(mut self, name: &str, values: Vec<f64>) -> Self {
        self.series.insert(name.to_string(), values);
        self
    }

    /// Add a 2-D variable, one inner vector per time index.
    pub fn with_matrix(mut self, name: &str, rows: Vec<Vec<f64>>) -> Self {
        self.matrices.insert(name.to_string(), rows);
        self
    }

    pub fn with_fill_value(mut self, name: &str, fill_value: f64) -> Self {
        self.fill_values.insert(name.to_string(), fill_value);
        self
    }

    fn missing(&self, what: &str) -> NetCdfError {
        NetCdfError::MissingData(format!("{} in {}", what, self.location))
    }
}

impl ArraySource for MemorySource {
    fn location(&self) -> &str {
        &self.location
    }

    fn dimension_len(&self, name: &str) -> NetCdfResult<usize> {
        self.dimensions
            .get(name)
            .copied()
            .ok_or_else(|| self.missing(&format!("{} dimension", name)))
    }

    fn read_series(&self, variable: &str) -> NetCdfResult<Vec<f64>> {
        if self.matrices.contains_key(variable) {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} has 2 dimensions, expected 1",
                variable
            )));
        }
        self.series
            .get(variable)
            .cloned()
            .ok_or_else(|| self.missing(&format!("{} variable", variable)))
    }

    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<Option<f64>>> {
        let fill_value = self.fill_values.get(variable).copied();
        Ok(self
            .read_series(variable)?
            .into_iter()
            .map(|v| mask_fill(v, fill_value))
            .collect())
    }

    fn read_row(&self, variable: &str, index: usize) -> NetCdfResult<Vec<Option<f64>>> {
        let rows = self
            .matrices
            .get(variable)
            .ok_or_else(|| self.missing(&format!("{} variable", variable)))?;
        let row = rows.get(index).ok_or_else(|| NetCdfError::IndexOutOfRange {
            variable: variable.to_string(),
            index,
            len: rows.len(),
        })?;
        let fill_value = self.fill_values.get(variable).copied();
        Ok(row.iter().map(|&v| mask_fill(v, fill_value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new("memory")
            .with_dimension("n_cells", 2)
            .with_series("time", vec![0.0, 1.0])
            .with_matrix("flow", vec![vec![1.0, -9999.0], vec![3.0, 4.0]])
            .with_fill_value("flow", -9999.0);

        assert_eq!(source.dimension_len("n_cells").unwrap(), 2);
        assert_eq!(source.read_at("time", 1).unwrap(), 1.0);
        assert_eq!(source.read_row("flow", 0).unwrap(), vec![Some(1.0), None]);
        assert!(source.read_row("flow", 2).is_err());
        assert!(source.read_series("flow").is_err());
        assert!(source.dimension_len("n_time").is_err());
    }
}
