//! Import runs.
//!
//! An [`Importer`] drives one invocation: resolve the minibasin filter
//! once, then for each dataset read the time axis, select the windows to
//! publish, publish them page by page and store the watermark. Datasets are
//! processed one after the other; a dataset whose source cannot be read is
//! reported and the next one still runs.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use netcdf_parser::{ArraySource, NetCdfResult};
use storage::{ImportState, SettingsStore, StateStore, UpsertSink};

use crate::config::{DatasetDescriptor, ImportStructure, RunOptions};
use crate::error::{IngestionError, Result};
use crate::extract::extract;
use crate::filter::MinibasinFilter;
use crate::publisher::{PagedPublisher, PublishReport, RowBatch};
use crate::rainfall::{
    extract_rain, list_rainfall_files, rainfall_target, supersede, time_axis, RAINFALL_TABLE,
};
use crate::resolver::{read_time_axis, resolve, TimeEntry};
use crate::watermark::{classify, record_outcome, WatermarkStatus};

/// Opens a source file for reading.
pub type SourceOpener = Box<dyn Fn(&Path) -> NetCdfResult<Box<dyn ArraySource>> + Send + Sync>;

/// Result of importing one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub table: String,
    /// Windows selected for publishing
    pub selected: usize,
    pub publish: PublishReport,
    /// Stored watermark, `None` when nothing was selected
    pub watermark: Option<ImportState>,
    pub elapsed: Duration,
}

impl DatasetReport {
    fn up_to_date(table: &str, elapsed: Duration) -> Self {
        Self {
            table: table.to_string(),
            selected: 0,
            publish: PublishReport::default(),
            watermark: None,
            elapsed,
        }
    }

    pub fn errors(&self) -> u32 {
        self.publish.errors
    }
}

/// A dataset whose run was aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFailure {
    pub table: String,
    pub error: String,
}

/// Result of a whole invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub datasets: Vec<DatasetReport>,
    pub failures: Vec<DatasetFailure>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Failed pages across every dataset.
    pub fn page_errors(&self) -> u32 {
        self.datasets.iter().map(DatasetReport::errors).sum()
    }

    /// Whether every dataset ran and every page was written.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.page_errors() == 0
    }
}

/// Watermark and pending work of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStatus {
    pub table: String,
    pub watermark: Option<ImportState>,
    /// Classification against the current source, or why the source
    /// could not be read
    pub status: std::result::Result<WatermarkStatus, String>,
}

/// Runs imports against a store.
pub struct Importer<'a, S> {
    store: &'a S,
    open: SourceOpener,
}

impl<'a, S> Importer<'a, S>
where
    S: UpsertSink + StateStore + SettingsStore,
{
    /// Create an importer reading files with the native netCDF reader.
    pub fn new(store: &'a S) -> Self {
        Self::with_opener(store, Box::new(netcdf_parser::open))
    }

    /// Create an importer with a custom source opener.
    pub fn with_opener(store: &'a S, open: SourceOpener) -> Self {
        Self { store, open }
    }

    /// Import every configured hydrological dataset under `root`.
    pub async fn import_hyfaa(
        &self,
        root: &Path,
        structure: &ImportStructure,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        options.validate()?;
        let started = Instant::now();

        let filter =
            MinibasinFilter::resolve(options.max_ordem, self.store, structure.default_max_ordem)
                .await?;

        let mut summary = RunSummary::default();
        for descriptor in &structure.datasets {
            match self.import_dataset(root, descriptor, &filter, options).await {
                Ok(report) => summary.datasets.push(report),
                Err(e) => {
                    error!(
                        dataset = %descriptor.kind,
                        table = %descriptor.table,
                        error = %e,
                        "Dataset import failed, watermark left unchanged"
                    );
                    summary.failures.push(DatasetFailure {
                        table: descriptor.table.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.elapsed = started.elapsed();
        log_summary(&summary);
        Ok(summary)
    }

    /// Import one hydrological dataset.
    #[instrument(skip_all, fields(dataset = %descriptor.kind, table = %descriptor.table))]
    pub async fn import_dataset(
        &self,
        root: &Path,
        descriptor: &DatasetDescriptor,
        filter: &MinibasinFilter,
        options: &RunOptions,
    ) -> Result<DatasetReport> {
        let started = Instant::now();
        let table = descriptor.table.as_str();
        let path = root.join(&descriptor.file);
        info!(path = %path.display(), "Processing dataset");

        let source = (self.open)(&path)?;
        let axis = read_time_axis(source.as_ref())?;
        let watermark = self.store.load_state(table).await?;
        let resolution = resolve(axis, watermark.as_ref(), options.force_update)
            .truncated(options.only_last_n);

        if resolution.is_empty() {
            info!("Database is up to date");
            return Ok(DatasetReport::up_to_date(table, started.elapsed()));
        }

        let target = descriptor.upsert_target()?;
        let publisher = PagedPublisher::new(self.store, &target, options.commit_page_size)?;
        let batches = resolution.work_set.iter().map(|entry| -> Result<RowBatch> {
            let records = filter.apply(extract(source.as_ref(), descriptor, entry)?);
            Ok(RowBatch::from_records(*entry, &records))
        });
        let publish = publisher.publish(batches).await?;

        self.finish(table, &resolution.work_set, publish, resolution.baseline_jd, started)
            .await
    }

    /// Import the rainfall files under `root`.
    #[instrument(skip_all, fields(table = RAINFALL_TABLE))]
    pub async fn import_rainfall(&self, root: &Path, options: &RunOptions) -> Result<DatasetReport> {
        options.validate()?;
        let started = Instant::now();

        let files = supersede(list_rainfall_files(root)?);
        let watermark = self.store.load_state(RAINFALL_TABLE).await?;
        let resolution = resolve(time_axis(&files), watermark.as_ref(), options.force_update)
            .truncated(options.only_last_n);

        if resolution.is_empty() {
            info!("Database is up to date");
            return Ok(DatasetReport::up_to_date(RAINFALL_TABLE, started.elapsed()));
        }

        let target = rainfall_target()?;
        let publisher = PagedPublisher::new(self.store, &target, options.commit_page_size)?;
        let batches = resolution.work_set.iter().map(|entry| -> Result<RowBatch> {
            let file = &files[entry.index];
            info!(file = %file.path.display(), "Publishing rainfall file");
            let source = (self.open)(&file.path)?;
            let records = extract_rain(source.as_ref(), file.observation_date())?;
            Ok(RowBatch::from_records(*entry, &records))
        });
        let publish = publisher.publish(batches).await?;

        let report = self
            .finish(RAINFALL_TABLE, &resolution.work_set, publish, resolution.baseline_jd, started)
            .await?;
        info!(
            windows = report.publish.windows,
            errors = report.errors(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Rainfall import finished"
        );
        Ok(report)
    }

    async fn finish(
        &self,
        table: &str,
        work_set: &[TimeEntry],
        publish: PublishReport,
        baseline_jd: f64,
        started: Instant,
    ) -> Result<DatasetReport> {
        let watermark = record_outcome(self.store, table, work_set, publish.errors, baseline_jd).await?;
        Ok(DatasetReport {
            table: table.to_string(),
            selected: work_set.len(),
            publish,
            watermark,
            elapsed: started.elapsed(),
        })
    }

    /// Watermark and pending work of every configured table.
    pub async fn status(&self, root: &Path, structure: &ImportStructure) -> Result<Vec<TableStatus>> {
        let mut statuses = Vec::with_capacity(structure.datasets.len());
        for descriptor in &structure.datasets {
            let table = descriptor.table.as_str();
            let watermark = self.store.load_state(table).await?;
            let axis = (self.open)(&root.join(&descriptor.file))
                .map_err(IngestionError::from)
                .and_then(|source| read_time_axis(source.as_ref()));
            statuses.push(table_status(table, watermark, axis));
        }
        Ok(statuses)
    }

    /// Watermark and pending work of the rainfall table.
    pub async fn rainfall_status(&self, root: &Path) -> Result<TableStatus> {
        let watermark = self.store.load_state(RAINFALL_TABLE).await?;
        let axis = list_rainfall_files(root).map(|files| time_axis(&supersede(files)));
        Ok(table_status(RAINFALL_TABLE, watermark, axis))
    }
}

fn table_status(
    table: &str,
    watermark: Option<ImportState>,
    axis: Result<Vec<TimeEntry>>,
) -> TableStatus {
    let status = match axis {
        Ok(axis) => Ok(classify(watermark.as_ref(), &axis)),
        Err(e) => {
            warn!(table, error = %e, "Cannot read source for status");
            Err(e.to_string())
        }
    };
    TableStatus {
        table: table.to_string(),
        watermark,
        status,
    }
}

fn log_summary(summary: &RunSummary) {
    for report in &summary.datasets {
        info!(
            table = %report.table,
            windows = report.publish.windows,
            rows = report.publish.rows_written,
            errors = report.errors(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Dataset summary"
        );
    }

    if summary.is_success() {
        info!(
            datasets = summary.datasets.len(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Import finished"
        );
    } else {
        warn!(
            datasets = summary.datasets.len(),
            failed_datasets = summary.failures.len(),
            page_errors = summary.page_errors(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Import finished with errors"
        );
    }
}
