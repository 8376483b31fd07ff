//! HYFAA ingester
//!
//! Imports HYFAA model outputs and rainfall forcing files from netCDF into
//! PostgreSQL, publishing only what changed since the previous run.

mod config;
mod config_loader;

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use hydro_common::jd_to_datetime;
use ingestion::{Importer, TableStatus};
use storage::{ImportState, PgStore, StateStore};

use config::{require, DatabaseSettings, HyfaaArgs, MigrateArgs, RainfallArgs, StatusArgs};

/// HYFAA ingester
#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Incremental import of HYFAA netCDF outputs into PostgreSQL")]
struct Cli {
    /// Import structure (datasets, variables, destination tables)
    #[arg(
        long,
        global = true,
        env = "HYFAA_IMPORT_STRUCTURE_CONFIG",
        default_value = "config/import.yaml"
    )]
    config: PathBuf,

    /// Log level
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import the configured HYFAA datasets
    Hyfaa(HyfaaArgs),
    /// Import the rainfall forcing files
    Rainfall(RainfallArgs),
    /// Show the watermark and pending work of every table
    Status(StatusArgs),
    /// Create the schema and the import tables
    Migrate(MigrateArgs),
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Ingester failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Run one subcommand. `Ok(false)` means the command ran but some data
/// could not be published.
async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Hyfaa(args) => {
            let root = require(args.rootpath.as_deref(), "rootpath")?;
            let options = args.import.run_options(args.max_ordem)?;
            let database = args.database.resolve()?;
            let structure = config_loader::load_structure(&cli.config)?;

            info!(root = %root.display(), schema = %database.schema, "Starting HYFAA import");
            let store = connect(&database, &structure.database).await?;
            let summary = Importer::new(&store)
                .import_hyfaa(root, &structure, &options)
                .await
                .context("HYFAA import failed")?;
            Ok(summary.is_success())
        }
        Command::Rainfall(args) => {
            let root = require(args.rootpath.as_deref(), "rootpath")?;
            let options = args.import.run_options(None)?;
            let database = args.database.resolve()?;
            let pool = config_loader::load_pool_settings(&cli.config)?;

            info!(root = %root.display(), schema = %database.schema, "Starting rainfall import");
            let store = connect(&database, &pool).await?;
            let report = Importer::new(&store)
                .import_rainfall(root, &options)
                .await
                .context("Rainfall import failed")?;
            Ok(report.errors() == 0)
        }
        Command::Status(args) => {
            let root = require(args.rootpath.as_deref(), "rootpath")?;
            let database = args.database.resolve()?;
            let structure = config_loader::load_structure(&cli.config)?;

            let store = connect(&database, &structure.database).await?;
            let importer = Importer::new(&store);
            let mut statuses = importer.status(root, &structure).await?;
            if let Some(rainfall) = args.rainfall_path.as_deref() {
                statuses.push(importer.rainfall_status(rainfall).await?);
            }

            for status in &statuses {
                println!("{}", format_status(status));
            }
            let reported: HashSet<&str> = statuses.iter().map(|s| s.table.as_str()).collect();
            for state in store.list_states().await? {
                if !reported.contains(state.table_name.as_str()) {
                    let watermark = describe_watermark(Some(&state));
                    println!("{:<32} {:<24} {}", state.table_name, "not configured", watermark);
                }
            }
            Ok(statuses.iter().all(|s| s.status.is_ok()))
        }
        Command::Migrate(args) => {
            let database = args.database.resolve()?;
            let structure = config_loader::load_structure(&cli.config)?;

            let store = connect(&database, &structure.database).await?;
            let tables: Vec<_> = structure
                .datasets
                .iter()
                .map(|d| (d.table.clone(), d.kind))
                .collect();
            store.migrate(&tables).await.context("Migration failed")?;
            info!(schema = %database.schema, tables = tables.len(), "Schema is up to date");
            Ok(true)
        }
    }
}

async fn connect(database: &DatabaseSettings, pool: &storage::PoolSettings) -> Result<PgStore> {
    PgStore::connect(&database.url, database.schema.clone(), pool)
        .await
        .with_context(|| format!("Cannot connect to database (schema {})", database.schema))
}

/// One line per table: name, pending work and watermarks.
fn format_status(status: &TableStatus) -> String {
    let classification = match &status.status {
        Ok(status) => status.to_string(),
        Err(e) => format!("source unreadable: {}", e),
    };
    format!(
        "{:<32} {:<24} {}",
        status.table,
        classification,
        describe_watermark(status.watermark.as_ref())
    )
}

fn describe_watermark(watermark: Option<&ImportState>) -> String {
    match watermark {
        Some(state) => format!(
            "last update {} ({} errors), complete up to {}",
            state.last_updated.format("%Y-%m-%d %H:%M"),
            state.update_errors,
            jd_to_datetime(state.last_updated_without_errors_jd)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| state.last_updated_without_errors_jd.to_string()),
        ),
        None => "no watermark".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::WatermarkStatus;

    #[test]
    fn test_parse_hyfaa_command() {
        let cli = Cli::try_parse_from([
            "ingester",
            "--log-format",
            "json",
            "hyfaa",
            "-r",
            "/data/hyfaa",
            "-d",
            "postgres://localhost/hyfaa",
            "-s",
            "sagui",
            "-f",
            "--only-last-n-days",
            "5",
            "--max-ordem",
            "3",
            "--commit-page-size",
            "20",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Hyfaa(args) = cli.command else {
            panic!("expected hyfaa command");
        };
        assert_eq!(args.rootpath, Some(PathBuf::from("/data/hyfaa")));
        assert_eq!(args.database.schema, "sagui");
        assert_eq!(args.max_ordem, Some(3));
        assert!(args.import.force_update);
        assert_eq!(args.import.only_last_n_days, Some(5));
        assert_eq!(args.import.commit_page_size, 20);
    }

    #[test]
    fn test_parse_migrate_command() {
        let cli = Cli::try_parse_from([
            "ingester",
            "migrate",
            "--db-connect-url",
            "postgres://localhost/hyfaa",
            "--config",
            "/etc/hyfaa/import.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/hyfaa/import.yaml"));
        assert!(matches!(cli.command, Command::Migrate(_)));
    }

    #[test]
    fn test_rainfall_rejects_max_ordem() {
        let result = Cli::try_parse_from(["ingester", "rainfall", "--max-ordem", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_status() {
        let status = TableStatus {
            table: "hyfaa_data_mgbstandard".to_string(),
            watermark: Some(ImportState::from_day_counts("hyfaa_data_mgbstandard", 26000.0, 26001.5, 2).unwrap()),
            status: Ok(WatermarkStatus::HasPendingWork { pending: 3 }),
        };
        let line = format_status(&status);
        assert!(line.starts_with("hyfaa_data_mgbstandard"));
        assert!(line.contains("3 pending windows"));
        assert!(line.contains("(2 errors)"));
        assert!(line.contains("complete up to 2021-03-10 12:00"));

        let never = TableStatus {
            table: "sagui_rainfall".to_string(),
            watermark: None,
            status: Err("rainfall directory /data does not exist".to_string()),
        };
        assert!(format_status(&never).contains("source unreadable"));
        assert!(format_status(&never).ends_with("no watermark"));
    }
}
