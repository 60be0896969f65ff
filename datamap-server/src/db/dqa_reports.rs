//! DQA report repository

use datamap_common::db::models::DqaReport;
use datamap_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Aggregate counts from one DQA run
#[derive(Debug, Clone, Copy)]
pub struct DqaCounts {
    pub valid_rows: i64,
    pub invalid_rows: i64,
    pub null_rows: i64,
    pub total_rows: i64,
}

pub async fn insert(
    pool: &PgPool,
    base_table_name: &str,
    counts: DqaCounts,
    dictionary_version: i32,
) -> Result<DqaReport> {
    let row = sqlx::query_as::<_, DqaReport>(
        r#"
        INSERT INTO dqa_reports
            (id, base_table_name, valid_rows, invalid_rows, null_rows, total_rows,
             dictionary_version)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(base_table_name)
    .bind(counts.valid_rows)
    .bind(counts.invalid_rows)
    .bind(counts.null_rows)
    .bind(counts.total_rows)
    .bind(dictionary_version)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Report history for one table, newest first
pub async fn list_for_table(pool: &PgPool, base_table_name: &str) -> Result<Vec<DqaReport>> {
    let rows = sqlx::query_as::<_, DqaReport>(
        "SELECT * FROM dqa_reports WHERE base_table_name = $1 ORDER BY created_at DESC",
    )
    .bind(base_table_name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Latest report per table across the whole staging schema
pub async fn latest_per_table(pool: &PgPool) -> Result<Vec<DqaReport>> {
    let rows = sqlx::query_as::<_, DqaReport>(
        r#"
        SELECT DISTINCT ON (base_table_name) *
        FROM dqa_reports
        ORDER BY base_table_name, created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
