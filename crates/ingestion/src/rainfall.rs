//! Rainfall forcing files.
//!
//! Rainfall comes as one small netCDF file per observation timestamp, each
//! holding a `rain` value per mesh cell. Files are revised by writing a new
//! file with a later production time; only the latest revision of each
//! observation timestamp is published.
//!
//! Every kept file becomes one [`TimeEntry`] (observation time, production
//! time), so rainfall goes through the same resolver, publisher and
//! watermark as the hydrological datasets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use hydro_common::datetime_to_jd;
use netcdf_parser::ArraySource;
use storage::{CellValue, SqlIdent, UpsertTarget};

use crate::error::{IngestionError, Result};
use crate::extract::{cell_ids, CellRecord};
use crate::metadata::{is_netcdf, parse_rainfall_filename, RainfallFileInfo};
use crate::resolver::TimeEntry;

/// Destination table, also the key of its watermark record.
pub const RAINFALL_TABLE: &str = "sagui_rainfall";
/// Dimension holding the cells in rainfall files.
pub const MESH_DIMENSION: &str = "n_meshes";
pub const RAIN_VARIABLE: &str = "rain";

/// A rainfall file and the metadata parsed from its name.
#[derive(Debug, Clone, PartialEq)]
pub struct RainfallFile {
    pub path: PathBuf,
    pub info: RainfallFileInfo,
}

impl RainfallFile {
    pub fn observation_date(&self) -> NaiveDate {
        self.info.observation_time.date_naive()
    }

    fn revision(&self) -> (DateTime<Utc>, u32) {
        (self.info.produced_time, self.info.counter)
    }
}

/// List the rainfall files directly under `root`.
///
/// Files whose name does not follow the rainfall layout are skipped.
pub fn list_rainfall_files(root: &Path) -> Result<Vec<RainfallFile>> {
    if !root.is_dir() {
        return Err(IngestionError::FileRead(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("rainfall directory {} does not exist", root.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !is_netcdf(entry.path()) {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        match parse_rainfall_filename(&name) {
            Some(info) => files.push(RainfallFile {
                path: entry.path().to_path_buf(),
                info,
            }),
            None => debug!(file = %name, "Skipping file with unexpected name"),
        }
    }

    debug!(root = %root.display(), files = files.len(), "Listed rainfall files");
    Ok(files)
}

/// Keep, for each observation timestamp, the latest revision only.
///
/// The result is ordered by observation time.
pub fn supersede(files: Vec<RainfallFile>) -> Vec<RainfallFile> {
    let total = files.len();
    let mut latest: BTreeMap<DateTime<Utc>, RainfallFile> = BTreeMap::new();
    for file in files {
        match latest.get(&file.info.observation_time) {
            Some(kept) if kept.revision() >= file.revision() => {}
            _ => {
                latest.insert(file.info.observation_time, file);
            }
        }
    }

    let kept: Vec<RainfallFile> = latest.into_values().collect();
    if kept.len() < total {
        info!(
            superseded = total - kept.len(),
            kept = kept.len(),
            "Ignoring superseded rainfall revisions"
        );
    }
    kept
}

/// Build the time axis of a list of rainfall files, one entry per file.
pub fn time_axis(files: &[RainfallFile]) -> Vec<TimeEntry> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            TimeEntry::new(
                index,
                datetime_to_jd(file.info.observation_time),
                datetime_to_jd(file.info.produced_time),
            )
        })
        .collect()
}

/// Rainfall over one cell at one date.
#[derive(Debug, Clone, PartialEq)]
pub struct RainRecord {
    pub cell_id: i16,
    pub date: NaiveDate,
    pub rain: Option<f64>,
}

impl CellRecord for RainRecord {
    fn cell_id(&self) -> i16 {
        self.cell_id
    }

    fn to_row(&self) -> Vec<CellValue> {
        vec![
            CellValue::SmallInt(self.cell_id),
            CellValue::Date(self.date),
            CellValue::Float(self.rain),
        ]
    }
}

/// One record per mesh cell of a rainfall file.
pub fn extract_rain(source: &dyn ArraySource, date: NaiveDate) -> Result<Vec<RainRecord>> {
    let n_meshes = source.dimension_len(MESH_DIMENSION)?;
    let ids = cell_ids(n_meshes)?;
    let values = source.read_values(RAIN_VARIABLE)?;
    if values.len() != n_meshes {
        return Err(IngestionError::MissingMetadata(format!(
            "{}: {} has {} values, expected {}",
            source.location(),
            RAIN_VARIABLE,
            values.len(),
            n_meshes
        )));
    }

    Ok(ids
        .zip(values)
        .map(|(cell_id, rain)| RainRecord { cell_id, date, rain })
        .collect())
}

/// Upsert target of the rainfall table.
pub fn rainfall_target() -> Result<UpsertTarget> {
    let cell_id = SqlIdent::new("cell_id")?;
    let date = SqlIdent::new("date")?;
    Ok(UpsertTarget::new(
        SqlIdent::new(RAINFALL_TABLE)?,
        vec![cell_id.clone(), date.clone(), SqlIdent::new(RAIN_VARIABLE)?],
        vec![cell_id, date],
    )?)
}
