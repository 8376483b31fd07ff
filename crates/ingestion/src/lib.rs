//! HYFAA import library.
//!
//! Publishes HYFAA-MGB model outputs (netCDF, one `[time, cell]` matrix per
//! variable) and rainfall forcing files into PostgreSQL, incrementally.
//!
//! # Architecture
//!
//! A run goes through the same stages for every dataset:
//!
//! - [`resolver`]: select the time windows ingested after the watermark
//! - [`filter`]: keep only minibasins ranked at or above the threshold
//! - [`extract`] / [`rainfall`]: reshape each window into one row per cell
//! - [`publisher`]: upsert rows page by page, one transaction per page
//! - [`watermark`]: store how far the table got, with or without errors
//!
//! [`Importer`] wires the stages together for the `ingester` service.

pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
mod importer;
pub mod metadata;
pub mod publisher;
pub mod rainfall;
pub mod resolver;
pub mod watermark;

// Re-exports
pub use config::{
    DatasetDescriptor, ImportStructure, RunOptions, SourceConfig, StructureConfig, VariableMapping,
};
pub use error::{IngestionError, Result};
pub use extract::{extract, CellRecord, HydroRecord};
pub use filter::MinibasinFilter;
pub use importer::{
    DatasetFailure, DatasetReport, Importer, RunSummary, SourceOpener, TableStatus,
};
pub use metadata::{parse_rainfall_filename, RainfallFileInfo};
pub use publisher::{PagedPublisher, PublishReport, RowBatch};
pub use rainfall::{RainRecord, RainfallFile, RAINFALL_TABLE};
pub use resolver::{resolve, truncate_last, Resolution, TimeEntry};
pub use watermark::{classify, record_outcome, WatermarkStatus};
