//! Command-line settings.
//!
//! Argument groups shared by the subcommands, each with an environment
//! fallback, and their conversion into validated library settings.
//! Required settings are checked here so a missing value fails before any
//! file or database access.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use hydro_common::HydroError;
use ingestion::RunOptions;
use storage::SqlIdent;

/// Database connection arguments.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// PostgreSQL connection URL
    #[arg(short = 'd', long = "db-connect-url", env = "HYFAA_DATABASE_URI", hide_env_values = true)]
    pub db_connect_url: Option<String>,

    /// Schema holding the import tables
    #[arg(short, long, env = "HYFAA_DATABASE_SCHEMA", default_value = "hyfaa")]
    pub schema: String,
}

/// Resolved database settings.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub schema: SqlIdent,
}

impl DatabaseArgs {
    pub fn resolve(&self) -> Result<DatabaseSettings> {
        let url = require(self.db_connect_url.as_deref(), "db-connect-url")?;
        if url.trim().is_empty() {
            return Err(HydroError::MissingSetting("db-connect-url".to_string()).into());
        }
        Ok(DatabaseSettings {
            url: url.to_string(),
            schema: SqlIdent::new(self.schema.as_str())?,
        })
    }
}

/// Options controlling which time windows are published.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Ignore the stored watermark and republish every time window
    #[arg(short, long)]
    pub force_update: bool,

    /// Only publish the most recent N time windows
    #[arg(long)]
    pub only_last_n_days: Option<usize>,

    /// Number of time windows committed per transaction
    #[arg(long, env = "HYFAA_IMPORT_COMMIT_PAGE_SIZE", default_value_t = 1)]
    pub commit_page_size: usize,
}

impl ImportArgs {
    /// Validated run options.
    pub fn run_options(&self, max_ordem: Option<i16>) -> Result<RunOptions> {
        let options = RunOptions {
            force_update: self.force_update,
            only_last_n: self.only_last_n_days,
            max_ordem,
            commit_page_size: self.commit_page_size,
        };
        options.validate()?;
        Ok(options)
    }
}

/// `hyfaa` subcommand arguments.
#[derive(Args, Debug, Clone)]
pub struct HyfaaArgs {
    /// Directory holding the HYFAA solution databases
    #[arg(short, long, env = "HYFAA_IMPORT_NETCDF_ROOT_PATH")]
    pub rootpath: Option<PathBuf>,

    /// Only publish minibasins with at least this `ordem`
    #[arg(long)]
    pub max_ordem: Option<i16>,

    #[command(flatten)]
    pub import: ImportArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

/// `rainfall` subcommand arguments.
#[derive(Args, Debug, Clone)]
pub struct RainfallArgs {
    /// Directory holding the rainfall files
    #[arg(short, long, env = "RAINFALL_NETCDF_FILES_PATH")]
    pub rootpath: Option<PathBuf>,

    #[command(flatten)]
    pub import: ImportArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

/// `status` subcommand arguments.
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Directory holding the HYFAA solution databases
    #[arg(short, long, env = "HYFAA_IMPORT_NETCDF_ROOT_PATH")]
    pub rootpath: Option<PathBuf>,

    /// Also report the rainfall table against this directory
    #[arg(long, env = "RAINFALL_NETCDF_FILES_PATH")]
    pub rainfall_path: Option<PathBuf>,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

/// `migrate` subcommand arguments.
#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,
}

/// The value of a required setting, or a missing-setting error naming it.
pub fn require<'a, T: ?Sized>(value: Option<&'a T>, name: &str) -> Result<&'a T> {
    value.ok_or_else(|| HydroError::MissingSetting(name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(url: Option<&str>, schema: &str) -> DatabaseArgs {
        DatabaseArgs {
            db_connect_url: url.map(str::to_string),
            schema: schema.to_string(),
        }
    }

    #[test]
    fn test_database_requires_url() {
        let err = database(None, "hyfaa").resolve().unwrap_err();
        assert_eq!(err.to_string(), "Missing required setting: db-connect-url");
        assert!(database(Some("  "), "hyfaa").resolve().is_err());
    }

    #[test]
    fn test_database_rejects_bad_schema() {
        assert!(database(Some("postgres://localhost/hyfaa"), "hyfaa; drop").resolve().is_err());
        let settings = database(Some("postgres://localhost/hyfaa"), "hyfaa").resolve().unwrap();
        assert_eq!(settings.schema.as_str(), "hyfaa");
    }

    #[test]
    fn test_run_options() {
        let args = ImportArgs {
            force_update: true,
            only_last_n_days: Some(5),
            commit_page_size: 10,
        };
        let options = args.run_options(Some(3)).unwrap();
        assert!(options.force_update);
        assert_eq!(options.only_last_n, Some(5));
        assert_eq!(options.max_ordem, Some(3));
        assert_eq!(options.commit_page_size, 10);
    }

    #[test]
    fn test_run_options_rejects_zero_page_size() {
        let args = ImportArgs {
            force_update: false,
            only_last_n_days: None,
            commit_page_size: 0,
        };
        assert!(args.run_options(None).is_err());
    }

    #[test]
    fn test_require() {
        let path = PathBuf::from("/data/hyfaa");
        assert_eq!(require(Some(path.as_path()), "rootpath").unwrap(), path.as_path());
        let missing: Option<&std::path::Path> = None;
        assert!(require(missing, "rootpath").is_err());
    }
}
