//! Source-system access for extraction runs
//!
//! Live connections (mysql/postgres/mssql) execute the generated query over
//! a driver-agnostic pool; csv/api sources read the pre-imported staging
//! table in the canonical store instead. Either way extraction receives
//! records with lower-cased keys and loosely typed JSON cells, and coercion
//! takes it from there.

use datamap_common::db::models::{AccessCredentials, Record};
use datamap_common::{Error, Result};
use serde_json::Value;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Column, PgPool, Row};
use tracing::debug;

/// A connected source ready to serve extraction queries
pub enum SourceReader {
    /// Live driver connection to the source EMR database
    Live(AnyPool),
    /// Flat-file/API staging table inside the canonical store
    Staged { pool: PgPool, table: String },
}

impl SourceReader {
    /// Connect to the active source described by its credentials
    ///
    /// Flat-file sources reuse the canonical store pool; live sources open
    /// a small driver-agnostic pool from the stored connection string.
    pub async fn connect(credentials: &AccessCredentials, canonical: &PgPool) -> Result<Self> {
        if credentials.is_flat_file() {
            return Ok(SourceReader::Staged {
                pool: canonical.clone(),
                table: credentials.staging_table(),
            });
        }

        let pool = AnyPoolOptions::new()
            .max_connections(2)
            .connect(&credentials.conn_string)
            .await?;
        debug!(source = %credentials.name, "Live source connection established");
        Ok(SourceReader::Live(pool))
    }

    /// Run the extraction query and collect every row as a record
    pub async fn fetch_records(&self, query: &str) -> Result<Vec<Record>> {
        match self {
            SourceReader::Live(pool) => {
                let rows = sqlx::query(query).fetch_all(pool).await?;
                Ok(rows.iter().map(any_row_to_record).collect())
            }
            SourceReader::Staged { pool, table } => {
                // Staged extracts ignore the live query; the staging table
                // already holds the flat projection
                let rows = sqlx::query(&format!("SELECT * FROM {}", table))
                    .fetch_all(pool)
                    .await?;
                Ok(rows.iter().map(pg_row_to_record).collect())
            }
        }
    }

    /// Probe the connection with a trivial query
    pub async fn test(&self) -> Result<()> {
        match self {
            SourceReader::Live(pool) => {
                sqlx::query("SELECT 1").fetch_one(pool).await?;
            }
            SourceReader::Staged { pool, table } => {
                let exists: bool = sqlx::query_scalar(
                    r#"
                    SELECT EXISTS(
                        SELECT 1 FROM information_schema.tables
                        WHERE table_schema = current_schema() AND table_name = $1
                    )
                    "#,
                )
                .bind(table)
                .fetch_one(pool)
                .await?;
                if !exists {
                    return Err(Error::NotFound(format!(
                        "staging table '{}' has not been imported",
                        table
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Decode a driver-agnostic row into a record with lower-cased keys
///
/// The Any driver exposes a narrow type set; each cell is tried as integer,
/// float, boolean, then string, and anything else becomes null. Coercion
/// downstream re-types cells against the dictionary terms.
fn any_row_to_record(row: &sqlx::any::AnyRow) -> Record {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        record.insert(column.name().to_lowercase(), value);
    }
    record
}

/// Decode a staging-table row; staging tables store every cell as text
fn pg_row_to_record(row: &sqlx::postgres::PgRow) -> Record {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        record.insert(column.name().to_lowercase(), value);
    }
    record
}
