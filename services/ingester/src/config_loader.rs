//! Import structure loader.
//!
//! Reads the YAML import structure (dataset sources, short names, database
//! pool settings), substitutes `${VAR}` and `${VAR:-default}` references
//! from the environment and validates the result before anything touches
//! the netCDF files or the database.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use ingestion::{ImportStructure, StructureConfig};
use storage::PoolSettings;

/// Load, expand and validate the import structure at `path`.
pub fn load_structure<P: AsRef<Path>>(path: P) -> Result<ImportStructure> {
    let path = path.as_ref();
    let expanded = read_expanded(path)?;

    let structure = StructureConfig::from_yaml(&expanded)
        .and_then(StructureConfig::validate)
        .with_context(|| format!("Invalid import structure in {}", path.display()))?;

    info!(
        config = %path.display(),
        datasets = structure.datasets.len(),
        "Loaded import structure"
    );
    Ok(structure)
}

/// Pool settings from the `database` section of the file at `path`.
///
/// The rainfall import needs nothing else from the structure file, so a
/// missing file yields the defaults.
pub fn load_pool_settings<P: AsRef<Path>>(path: P) -> Result<PoolSettings> {
    #[derive(Deserialize)]
    struct DatabaseSection {
        #[serde(default)]
        database: PoolSettings,
    }

    let path = path.as_ref();
    if !path.exists() {
        debug!(config = %path.display(), "No structure file, using default pool settings");
        return Ok(PoolSettings::default());
    }

    let expanded = read_expanded(path)?;
    let section: DatabaseSection = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse database settings in {}", path.display()))?;
    Ok(section.database)
}

fn read_expanded(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read import structure from {}", path.display()))?;
    expand_env_vars(&content).with_context(|| format!("In {}", path.display()))
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Replace every `${...}` reference in `content`.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("Unclosed variable substitution: ${{{}", after))?;
        result.push_str(&resolve_var_expr(&after[..end])?);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`. An empty variable counts as unset
/// when a default is given.
fn resolve_var_expr(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => Ok(std::env::var(name.trim())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_string())),
        None => std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STRUCTURE: &str = r#"
sources:
  - name: mgbstandard
    file: ${LOADER_TEST_SOLUTION_DIR:-mgbstandard_solution_databases}/post_processing_portal.nc
    nc_data_vars: [streamflow]
    tablename: hyfaa_data_mgbstandard
short_names:
  streamflow: flow_mean
database:
  max_connections: ${LOADER_TEST_MAX_CONNECTIONS:-4}
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("LOADER_TEST_SCHEMA", "hyfaa");
        let result = expand_env_vars("schema: ${LOADER_TEST_SCHEMA}_v2").unwrap();
        assert_eq!(result, "schema: hyfaa_v2");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("LOADER_TEST_UNSET");
        let result = expand_env_vars("a/${LOADER_TEST_UNSET:-default}/b").unwrap();
        assert_eq!(result, "a/default/b");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("LOADER_TEST_REQUIRED");
        assert!(expand_env_vars("${LOADER_TEST_REQUIRED}").is_err());
    }

    #[test]
    fn test_expand_env_vars_unclosed() {
        assert!(expand_env_vars("file: ${LOADER_TEST_SCHEMA").is_err());
    }

    #[test]
    fn test_resolve_var_expr_empty_uses_default() {
        std::env::set_var("LOADER_TEST_EMPTY", "");
        assert_eq!(resolve_var_expr("LOADER_TEST_EMPTY:-1").unwrap(), "1");
    }

    #[test]
    fn test_load_structure() {
        std::env::remove_var("LOADER_TEST_SOLUTION_DIR");
        let file = write_config(STRUCTURE);

        let structure = load_structure(file.path()).unwrap();
        assert_eq!(structure.datasets.len(), 1);
        assert_eq!(
            structure.datasets[0].file,
            Path::new("mgbstandard_solution_databases/post_processing_portal.nc")
        );
        assert_eq!(structure.datasets[0].variables[0].column.as_str(), "flow_mean");
    }

    #[test]
    fn test_load_shipped_structure() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/import.yaml");
        let structure = load_structure(path).unwrap();

        let tables: Vec<&str> = structure.datasets.iter().map(|d| d.table.as_str()).collect();
        assert_eq!(
            tables,
            vec!["hyfaa_data_mgbstandard", "hyfaa_data_forecast", "hyfaa_data_assimilated"]
        );
        assert_eq!(structure.datasets[1].variables.len(), 8);
    }

    #[test]
    fn test_load_structure_missing_file() {
        let err = load_structure("/nonexistent/import.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read import structure"));
    }

    #[test]
    fn test_load_structure_rejects_invalid() {
        let file = write_config("sources: []\nshort_names: {}\n");
        assert!(load_structure(file.path()).is_err());
    }

    #[test]
    fn test_load_pool_settings() {
        std::env::remove_var("LOADER_TEST_MAX_CONNECTIONS");
        let file = write_config(STRUCTURE);
        assert_eq!(load_pool_settings(file.path()).unwrap().max_connections, 4);

        let defaults = load_pool_settings("/nonexistent/import.yaml").unwrap();
        assert_eq!(defaults.max_connections, PoolSettings::default().max_connections);
    }
}
