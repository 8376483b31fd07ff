//! PostgreSQL implementation of the storage traits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use hydro_common::{DatasetKind, HydroError, HydroResult};

use crate::ident::SqlIdent;
use crate::settings::{SaguiConfig, SettingsStore, DEFAULT_USE_DATASET};
use crate::state::{ImportState, ImportStateRow, StateStore};
use crate::upsert::{CellValue, UpsertSink, UpsertTarget};

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        // One connection is enough for the sequential importer; the second
        // keeps watermark reads from queueing behind a long flush.
        Self {
            max_connections: 2,
            connection_timeout_secs: 30,
        }
    }
}

/// Database connection pool plus the schema holding every import table.
pub struct PgStore {
    pool: PgPool,
    schema: SqlIdent,
}

impl PgStore {
    /// Connect to the database and bind the store to `schema`.
    pub async fn connect(
        database_url: &str,
        schema: SqlIdent,
        settings: &PoolSettings,
    ) -> HydroResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(settings.connection_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Connection failed: {}", e)))?;

        debug!(schema = %schema, "Connected to database");
        Ok(Self { pool, schema })
    }

    /// Create the schema and every import table if they do not exist.
    ///
    /// `data_tables` lists the destination table of each configured dataset.
    pub async fn migrate(&self, data_tables: &[(SqlIdent, DatasetKind)]) -> HydroResult<()> {
        for statement in schema_statements(&self.schema, data_tables) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| HydroError::DatabaseError(format!("Migration failed: {}", e)))?;
        }

        info!(schema = %self.schema, tables = data_tables.len(), "Schema is up to date");
        Ok(())
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.schema, table)
    }
}

#[async_trait]
impl UpsertSink for PgStore {
    async fn upsert(&self, target: &UpsertTarget, rows: &[Vec<CellValue>]) -> HydroResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        target.check_rows(rows)?;

        let table = target.table();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Begin failed on {}: {}", table, e)))?;

        let mut affected = 0;
        let rows = target.dedup_rows(rows);
        for chunk in rows.chunks(target.rows_per_statement()) {
            let mut builder = QueryBuilder::<Postgres>::new(target.insert_prefix(&self.schema));
            builder.push_values(chunk, |mut separated, row| {
                for value in row.iter() {
                    match *value {
                        CellValue::SmallInt(v) => {
                            separated.push_bind(v);
                        }
                        CellValue::Date(v) => {
                            separated.push_bind(v);
                        }
                        CellValue::Timestamp(v) => {
                            separated.push_bind(v);
                        }
                        CellValue::Bool(v) => {
                            separated.push_bind(v);
                        }
                        CellValue::Float(v) => {
                            separated.push_bind(v);
                        }
                    }
                }
            });
            builder.push(target.conflict_clause());

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| HydroError::DatabaseError(format!("Upsert into {} failed: {}", table, e)))?;
            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Commit failed on {}: {}", table, e)))?;

        Ok(affected)
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn load_state(&self, table_name: &str) -> HydroResult<Option<ImportState>> {
        let sql = format!(
            "SELECT tablename, last_updated, last_updated_jd, update_errors, \
             last_updated_without_errors, last_updated_without_errors_jd \
             FROM {} WHERE tablename = $1",
            self.qualified("sagui_importstate")
        );

        let row = sqlx::query_as::<_, ImportStateRow>(&sql)
            .bind(table_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn save_state(&self, state: &ImportState) -> HydroResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                tablename, last_updated, last_updated_jd, update_errors,
                last_updated_without_errors, last_updated_without_errors_jd
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tablename)
            DO UPDATE SET
                last_updated = EXCLUDED.last_updated,
                last_updated_jd = EXCLUDED.last_updated_jd,
                update_errors = EXCLUDED.update_errors,
                last_updated_without_errors = EXCLUDED.last_updated_without_errors,
                last_updated_without_errors_jd = EXCLUDED.last_updated_without_errors_jd
            "#,
            self.qualified("sagui_importstate")
        );

        sqlx::query(&sql)
            .bind(&state.table_name)
            .bind(state.last_updated)
            .bind(state.last_updated_jd)
            .bind(state.update_errors.min(i16::MAX as u32) as i16)
            .bind(state.last_updated_without_errors)
            .bind(state.last_updated_without_errors_jd)
            .execute(&self.pool)
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Watermark update failed: {}", e)))?;

        Ok(())
    }

    async fn list_states(&self) -> HydroResult<Vec<ImportState>> {
        let sql = format!(
            "SELECT tablename, last_updated, last_updated_jd, update_errors, \
             last_updated_without_errors, last_updated_without_errors_jd \
             FROM {} ORDER BY tablename",
            self.qualified("sagui_importstate")
        );

        let rows = sqlx::query_as::<_, ImportStateRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load_config(&self) -> HydroResult<Option<SaguiConfig>> {
        let sql = format!(
            "SELECT max_ordem, use_dataset FROM {} ORDER BY id DESC LIMIT 1",
            self.qualified("sagui_saguiconfig")
        );

        let row = sqlx::query_as::<_, (Option<i16>, Option<String>)>(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(row.map(|(max_ordem, use_dataset)| {
            let use_dataset = match use_dataset.as_deref().map(str::parse::<DatasetKind>) {
                Some(Ok(kind)) => kind,
                Some(Err(e)) => {
                    warn!(error = %e, "Ignoring invalid use_dataset in configuration record");
                    DEFAULT_USE_DATASET
                }
                None => DEFAULT_USE_DATASET,
            };
            SaguiConfig {
                max_ordem,
                use_dataset,
            }
        }))
    }

    async fn minibasins_with_min_ordem(&self, min_ordem: i16) -> HydroResult<Vec<i16>> {
        let sql = format!(
            "SELECT mini FROM {} WHERE ordem >= $1 ORDER BY mini",
            self.qualified("hyfaa_minibasins_data")
        );

        sqlx::query_scalar::<_, i16>(&sql)
            .bind(min_ordem)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HydroError::DatabaseError(format!("Query failed: {}", e)))
    }
}

/// DDL for the schema, in execution order.
pub fn schema_statements(schema: &SqlIdent, data_tables: &[(SqlIdent, DatasetKind)]) -> Vec<String> {
    let mut statements = vec![format!("CREATE SCHEMA IF NOT EXISTS {schema}")];

    for (table, kind) in data_tables {
        let value_columns: String = kind
            .value_columns()
            .iter()
            .map(|c| format!("    {c} DOUBLE PRECISION,\n"))
            .collect();
        statements.push(format!(
            r#"
CREATE TABLE IF NOT EXISTS {schema}.{table} (
    id BIGSERIAL PRIMARY KEY,
    cell_id SMALLINT NOT NULL,
    date DATE NOT NULL,
    update_time TIMESTAMPTZ,
    is_analysis BOOLEAN,
{value_columns}    flow_expected DOUBLE PRECISION,
    flow_anomaly DOUBLE PRECISION,
    CONSTRAINT {table}_unique_cellid_day UNIQUE (cell_id, date)
)"#
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {table}_date_idx ON {schema}.{table} (date DESC)"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {table}_cellid_date_idx ON {schema}.{table} (cell_id, date DESC)"
        ));
    }

    statements.extend([
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {schema}.sagui_rainfall (
    id BIGSERIAL PRIMARY KEY,
    cell_id SMALLINT NOT NULL,
    date DATE NOT NULL,
    rain DOUBLE PRECISION,
    CONSTRAINT rainfall_unique_cellid_day UNIQUE (cell_id, date)
)"#
        ),
        format!("CREATE INDEX IF NOT EXISTS sagui_rainfall_date_idx ON {schema}.sagui_rainfall (date DESC)"),
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {schema}.hyfaa_minibasins_data (
    mini SMALLINT PRIMARY KEY,
    ordem SMALLINT NOT NULL,
    sub SMALLINT NOT NULL,
    width DOUBLE PRECISION,
    depth DOUBLE PRECISION
)"#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS hyfaa_minibasins_data_ordem_idx ON {schema}.hyfaa_minibasins_data (ordem, mini)"
        ),
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {schema}.sagui_saguiconfig (
    id SERIAL PRIMARY KEY,
    max_ordem SMALLINT DEFAULT 12,
    use_dataset VARCHAR(15) NOT NULL DEFAULT 'assimilated'
)"#
        ),
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {schema}.sagui_importstate (
    tablename VARCHAR(50) PRIMARY KEY,
    last_updated TIMESTAMPTZ NOT NULL,
    last_updated_jd DOUBLE PRECISION NOT NULL DEFAULT 0,
    update_errors SMALLINT NOT NULL DEFAULT 0,
    last_updated_without_errors TIMESTAMPTZ NOT NULL,
    last_updated_without_errors_jd DOUBLE PRECISION NOT NULL DEFAULT 0
)"#
        ),
    ]);

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> SqlIdent {
        SqlIdent::new(s).unwrap()
    }

    #[test]
    fn test_schema_statements_cover_data_tables() {
        let statements = schema_statements(
            &ident("hyfaa"),
            &[(ident("hyfaa_data_mgbstandard"), DatasetKind::MgbStandard)],
        );

        assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS hyfaa");
        let table = &statements[1];
        assert!(table.contains("CREATE TABLE IF NOT EXISTS hyfaa.hyfaa_data_mgbstandard"));
        assert!(table.contains("elevation_mean DOUBLE PRECISION"));
        assert!(!table.contains("flow_mad"));
        assert!(table.contains("hyfaa_data_mgbstandard_unique_cellid_day UNIQUE (cell_id, date)"));
        assert!(statements.iter().any(|s| s.contains("hyfaa.sagui_importstate")));
        assert!(statements.iter().any(|s| s.contains("hyfaa.sagui_rainfall")));
    }

    #[test]
    fn test_pool_settings_default() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 2);
        assert_eq!(settings.connection_timeout_secs, 30);
    }

    /// Round trip against a real database.
    /// Run with: DATABASE_URL=postgres://... cargo test -p storage -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_upsert_and_watermark_roundtrip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let schema = ident("hyfaa_storage_test");
        let store = PgStore::connect(&url, schema, &PoolSettings::default())
            .await
            .unwrap();
        store.migrate(&[]).await.unwrap();

        let target = UpsertTarget::new(
            ident("sagui_rainfall"),
            vec![ident("cell_id"), ident("date"), ident("rain")],
            vec![ident("cell_id"), ident("date")],
        )
        .unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2022, 6, 27).unwrap();
        let rows = vec![
            vec![CellValue::SmallInt(1), CellValue::Date(date), CellValue::Float(Some(1.0))],
            vec![CellValue::SmallInt(2), CellValue::Date(date), CellValue::Float(None)],
        ];
        assert_eq!(store.upsert(&target, &rows).await.unwrap(), 2);
        // Re-upserting the same key overwrites instead of failing
        assert_eq!(store.upsert(&target, &rows).await.unwrap(), 2);

        let state = ImportState::from_day_counts("sagui_rainfall", 26_475.0, 26_475.4, 0).unwrap();
        store.save_state(&state).await.unwrap();
        let loaded = store.load_state("sagui_rainfall").await.unwrap().unwrap();
        assert_eq!(loaded.last_updated_jd, 26_475.0);
        assert_eq!(loaded.update_errors, 0);
    }
}
