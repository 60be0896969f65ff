//! Cached extraction-SQL repository

use chrono::Utc;
use datamap_common::db::models::ExtractQuery;
use datamap_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn find(
    pool: &PgPool,
    base_repository: &str,
    source_system_id: Uuid,
) -> Result<Option<ExtractQuery>> {
    let row = sqlx::query_as::<_, ExtractQuery>(
        "SELECT * FROM extracts_queries WHERE base_repository = $1 AND source_system_id = $2",
    )
    .bind(base_repository)
    .bind(source_system_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Upsert the cached query for a (repository, source system) pair
///
/// A custom query posted by the user sets `is_custom`; regeneration from
/// mapping edits clears it. Regeneration must not overwrite a custom query
/// — callers check `is_custom` on the existing row first.
pub async fn upsert(
    pool: &PgPool,
    base_repository: &str,
    source_system_id: Uuid,
    query: &str,
    is_custom: bool,
) -> Result<ExtractQuery> {
    let row = sqlx::query_as::<_, ExtractQuery>(
        r#"
        INSERT INTO extracts_queries (id, query, base_repository, source_system_id, is_custom)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (base_repository, source_system_id)
        DO UPDATE SET query = EXCLUDED.query, is_custom = EXCLUDED.is_custom, updated_at = $6
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(query)
    .bind(base_repository)
    .bind(source_system_id)
    .bind(is_custom)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}
