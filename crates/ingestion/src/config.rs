//! Import structure and run options.
//!
//! The import structure says where each dataset lives relative to the
//! netCDF root path, which variables to read and how they are named in the
//! destination table. It is deserialized from YAML as a [`StructureConfig`]
//! and validated into an [`ImportStructure`] before any I/O happens.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use hydro_common::DatasetKind;
use storage::{PoolSettings, SqlIdent, UpsertTarget};

use crate::error::{IngestionError, Result};

/// Columns every hydrological table starts with, conflict key first.
pub const HYDRO_KEY_COLUMNS: [&str; 2] = ["cell_id", "date"];
const HYDRO_COMMON_COLUMNS: [&str; 2] = ["update_time", "is_analysis"];

// ============================================================================
// Raw configuration (as written in YAML)
// ============================================================================

/// Import structure as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureConfig {
    pub sources: Vec<SourceConfig>,
    /// netCDF variable name -> destination column name
    pub short_names: HashMap<String, String>,
    /// Minimum `ordem` used when neither the command line nor the
    /// configuration record provides one
    #[serde(default)]
    pub default_max_ordem: Option<i16>,
    #[serde(default)]
    pub database: PoolSettings,
}

/// One dataset entry of the `sources` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: DatasetKind,
    /// Path of the netCDF file, relative to the root path
    pub file: PathBuf,
    pub nc_data_vars: Vec<String>,
    /// Destination table, the variant's conventional table when omitted
    #[serde(default)]
    pub tablename: Option<String>,
}

// ============================================================================
// Validated configuration
// ============================================================================

/// A netCDF variable and the column it is published to.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMapping {
    pub variable: String,
    pub column: SqlIdent,
}

/// A validated dataset: which file to read, which variables, and where
/// to publish them.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub kind: DatasetKind,
    pub file: PathBuf,
    pub table: SqlIdent,
    pub variables: Vec<VariableMapping>,
}

impl DatasetDescriptor {
    /// Validate a raw source entry against the short-name mapping.
    pub fn from_config(source: &SourceConfig, short_names: &HashMap<String, String>) -> Result<Self> {
        let kind = source.name;
        let tablename = source.tablename.as_deref().unwrap_or(kind.default_table());
        let table = SqlIdent::new(tablename)
            .map_err(|e| IngestionError::InvalidConfig(format!("{}: {}", kind, e)))?;

        if source.file.as_os_str().is_empty() {
            return Err(IngestionError::InvalidConfig(format!("{}: empty file path", kind)));
        }
        if source.file.is_absolute() {
            return Err(IngestionError::InvalidConfig(format!(
                "{}: file {} must be relative to the root path",
                kind,
                source.file.display()
            )));
        }
        if source.nc_data_vars.is_empty() {
            return Err(IngestionError::InvalidConfig(format!("{}: no variables configured", kind)));
        }

        let mut variables: Vec<VariableMapping> = Vec::with_capacity(source.nc_data_vars.len());
        for variable in &source.nc_data_vars {
            let short_name = short_names.get(variable).ok_or_else(|| {
                IngestionError::InvalidConfig(format!("{}: no short name for variable {}", kind, variable))
            })?;
            let column = SqlIdent::new(short_name.as_str())
                .map_err(|e| IngestionError::InvalidConfig(format!("{}: {}", kind, e)))?;
            if !kind.has_column(column.as_str()) {
                return Err(IngestionError::InvalidConfig(format!(
                    "{}: table {} has no column {} (mapped from {})",
                    kind, table, column, variable
                )));
            }
            if variables.iter().any(|m| m.column == column) {
                return Err(IngestionError::InvalidConfig(format!(
                    "{}: column {} is mapped twice",
                    kind, column
                )));
            }
            variables.push(VariableMapping {
                variable: variable.clone(),
                column,
            });
        }

        Ok(Self {
            kind,
            file: source.file.clone(),
            table,
            variables,
        })
    }

    /// Upsert target: key columns, common columns, then one column per
    /// variable in configuration order.
    pub fn upsert_target(&self) -> Result<UpsertTarget> {
        let mut columns = Vec::with_capacity(4 + self.variables.len());
        for name in HYDRO_KEY_COLUMNS.iter().chain(HYDRO_COMMON_COLUMNS.iter()) {
            columns.push(SqlIdent::new(*name)?);
        }
        columns.extend(self.variables.iter().map(|m| m.column.clone()));

        let conflict = HYDRO_KEY_COLUMNS
            .iter()
            .map(|name| SqlIdent::new(*name))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(UpsertTarget::new(self.table.clone(), columns, conflict)?)
    }
}

/// The validated import structure.
#[derive(Debug, Clone)]
pub struct ImportStructure {
    pub datasets: Vec<DatasetDescriptor>,
    pub default_max_ordem: Option<i16>,
    pub database: PoolSettings,
}

impl StructureConfig {
    /// Parse YAML without environment expansion.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| IngestionError::InvalidConfig(format!("Failed to parse structure YAML: {}", e)))
    }

    /// Check every dataset entry and produce the validated structure.
    pub fn validate(self) -> Result<ImportStructure> {
        if self.sources.is_empty() {
            return Err(IngestionError::InvalidConfig("no sources configured".to_string()));
        }

        let mut datasets: Vec<DatasetDescriptor> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let descriptor = DatasetDescriptor::from_config(source, &self.short_names)?;
            if datasets.iter().any(|d| d.table == descriptor.table) {
                return Err(IngestionError::InvalidConfig(format!(
                    "table {} is configured twice",
                    descriptor.table
                )));
            }
            datasets.push(descriptor);
        }

        if let Some(ordem) = self.default_max_ordem {
            if ordem < 0 {
                return Err(IngestionError::InvalidConfig(format!(
                    "default_max_ordem must be >= 0, got {}",
                    ordem
                )));
            }
        }

        Ok(ImportStructure {
            datasets,
            default_max_ordem: self.default_max_ordem,
            database: self.database,
        })
    }
}

// ============================================================================
// Run options
// ============================================================================

/// Per-invocation options, shared read-only by every stage of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Ignore the watermark and publish the whole time axis
    pub force_update: bool,
    /// Only publish the last N entries of the work set
    pub only_last_n: Option<usize>,
    /// Minimum `ordem` from the command line
    pub max_ordem: Option<i16>,
    /// Number of time windows per transaction
    pub commit_page_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_update: false,
            only_last_n: None,
            max_ordem: None,
            commit_page_size: 1,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.commit_page_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "commit page size must be >= 1".to_string(),
            ));
        }
        if self.only_last_n == Some(0) {
            return Err(IngestionError::InvalidConfig(
                "only-last-n-days must be >= 1".to_string(),
            ));
        }
        if matches!(self.max_ordem, Some(o) if o < 0) {
            return Err(IngestionError::InvalidConfig("max ordem must be >= 0".to_string()));
        }
        Ok(())
    }
}
