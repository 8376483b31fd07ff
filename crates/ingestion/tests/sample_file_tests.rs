//! Tests against real HYFAA outputs, skipped unless the sample files are
//! available (see `test_utils::find_test_file`) and the crate is built
//! with the `native` reader.
#![cfg(feature = "native")]

use ingestion::resolver::read_time_axis;
use ingestion::{extract, resolve, StructureConfig};
use netcdf_parser::ArraySource;
use test_utils::{require_test_file, STRUCTURE_YAML};

#[test]
fn test_read_mgbstandard_sample() {
    let path = require_test_file!("post_processing_portal.nc");
    let source = netcdf_parser::open(&path).unwrap();

    let axis = read_time_axis(source.as_ref()).unwrap();
    assert!(!axis.is_empty());
    assert!(axis.windows(2).all(|w| w[0].index + 1 == w[1].index));

    let structure = StructureConfig::from_yaml(STRUCTURE_YAML)
        .unwrap()
        .validate()
        .unwrap();
    let descriptor = &structure.datasets[0];
    let resolution = resolve(axis, None, false);
    let last = resolution.work_set.last().unwrap();
    let records = extract(source.as_ref(), descriptor, last).unwrap();

    let n_cells = source.dimension_len("n_cells").unwrap();
    assert_eq!(records.len(), n_cells);
    assert_eq!(records[0].cell_id, 1);
    assert_eq!(records[0].values.len(), descriptor.variables.len());
}
