//! Storage abstractions for the HYFAA import pipeline.
//!
//! Provides:
//! - Batch upsert into per-dataset tables with a declared conflict key
//! - The import watermark table (`sagui_importstate`)
//! - Read access to the configuration record and minibasin ranks
//!
//! Each concern is a trait so the pipeline can run against PostgreSQL
//! ([`PgStore`]) or an in-memory store in tests.

pub mod ident;
pub mod pg;
pub mod settings;
pub mod state;
pub mod upsert;

pub use ident::SqlIdent;
pub use pg::{PgStore, PoolSettings};
pub use settings::{SaguiConfig, SettingsStore, DEFAULT_USE_DATASET};
pub use state::{ImportState, StateStore};
pub use upsert::{CellValue, UpsertSink, UpsertTarget};
