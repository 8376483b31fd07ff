//! Common test fixtures.
//!
//! Synthetic HYFAA and rainfall sources, and the import structure used by
//! integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use crate::memory::MemorySource;

/// Variables of the mgbstandard dataset, in configuration order.
pub const MGBSTANDARD_VARIABLES: [&str; 2] =
    ["water_elevation_catchment_mean", "streamflow_catchment_mean"];

/// Import structure with the mgbstandard and assimilated datasets.
pub const STRUCTURE_YAML: &str = r#"
sources:
  - name: mgbstandard
    file: mgbstandard_solution_databases/post_processing_portal.nc
    nc_data_vars:
      - water_elevation_catchment_mean
      - streamflow_catchment_mean
    tablename: hyfaa_data_mgbstandard
  - name: assimilated
    file: assimilated_solution_databases/post_processing_portal.nc
    nc_data_vars:
      - water_elevation_catchment_mean
      - streamflow_catchment_mean
      - streamflow_catchment_mad
    tablename: hyfaa_data_assimilated
short_names:
  water_elevation_catchment_mean: elevation_mean
  water_elevation_catchment_median: elevation_median
  water_elevation_catchment_std: elevation_stddev
  water_elevation_catchment_mad: elevation_mad
  streamflow_catchment_mean: flow_mean
  streamflow_catchment_median: flow_median
  streamflow_catchment_std: flow_stddev
  streamflow_catchment_mad: flow_mad
"#;

/// Value stored for `variable` (position in the configured list) at time
/// index `index` and cell `cell_id`.
pub fn window_value(variable: usize, index: usize, cell_id: i16) -> f64 {
    variable as f64 * 1000.0 + index as f64 + cell_id as f64 / 100.0
}

/// A HYFAA-like source.
///
/// `windows` lists `(time_jd, ingested_jd)` per time index. Every window is
/// an analysis window; values follow [`window_value`].
pub fn hyfaa_source(windows: &[(f64, f64)], n_cells: usize, variables: &[&str]) -> MemorySource {
    let mut source = MemorySource::new("memory://post_processing_portal.nc")
        .with_dimension("n_time", windows.len())
        .with_dimension("n_cells", n_cells)
        .with_series("time", windows.iter().map(|w| w.0).collect())
        .with_series("time_added_to_hydb", windows.iter().map(|w| w.1).collect())
        .with_series("is_analysis", vec![1.0; windows.len()]);

    for (v, name) in variables.iter().enumerate() {
        let rows = (0..windows.len())
            .map(|index| {
                (1..=n_cells)
                    .map(|cell| window_value(v, index, cell as i16))
                    .collect()
            })
            .collect();
        source = source.with_matrix(name, rows);
    }
    source
}

/// A rainfall source with one value per mesh cell.
pub fn rain_source(values: Vec<f64>) -> MemorySource {
    MemorySource::new("memory://rainfall.nc")
        .with_dimension("n_meshes", values.len())
        .with_series("rain", values)
}

/// Rainfall file name for the given compact timestamps.
pub fn rainfall_filename(observation: &str, produced: &str, counter: u32) -> String {
    format!("gsmap_onmesh_DATA_{}_{}_{}.nc", observation, produced, counter)
}

/// Create empty files named `names` under `dir`.
pub fn touch_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, b"").expect("Failed to create test file");
            path
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::ArraySource;

    #[test]
    fn test_hyfaa_source_layout() {
        let source = hyfaa_source(&[(0.0, 0.0), (1.0, 1.5)], 3, &MGBSTANDARD_VARIABLES);
        assert_eq!(source.dimension_len("n_time").unwrap(), 2);
        assert_eq!(source.read_at("time_added_to_hydb", 1).unwrap(), 1.5);
        let row = source.read_row("streamflow_catchment_mean", 1).unwrap();
        assert_eq!(row[2], Some(window_value(1, 1, 3)));
    }

    #[test]
    fn test_touch_files() {
        let dir = tempfile::tempdir().unwrap();
        let name = rainfall_filename("20220627T0000", "20220627T104312", 1);
        let paths = touch_files(dir.path(), &[name.as_str()]);
        assert!(paths[0].exists());
    }
}
