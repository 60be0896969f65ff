//! Append-only dictionary change log

use datamap_common::db::models::{ChangeOperation, DictionaryChangeLog, DictionaryTerm};
use datamap_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Record one term mutation under the version it produced
pub async fn append(
    pool: &PgPool,
    dictionary_id: Uuid,
    term_id: Option<Uuid>,
    operation: ChangeOperation,
    old_value: Option<&DictionaryTerm>,
    new_value: Option<&DictionaryTerm>,
    version_number: i32,
) -> Result<()> {
    let old_json = old_value.map(serde_json::to_value).transpose()?;
    let new_json = new_value.map(serde_json::to_value).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO dictionary_change_log
            (id, dictionary_id, term_id, operation, old_value, new_value, version_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(dictionary_id)
    .bind(term_id)
    .bind(operation.as_str())
    .bind(old_json)
    .bind(new_json)
    .bind(version_number)
    .execute(pool)
    .await?;

    Ok(())
}

/// Full change history of one dictionary, newest version first
pub async fn list_for_dictionary(
    pool: &PgPool,
    dictionary_id: Uuid,
) -> Result<Vec<DictionaryChangeLog>> {
    let rows = sqlx::query_as::<_, DictionaryChangeLog>(
        r#"
        SELECT * FROM dictionary_change_log
        WHERE dictionary_id = $1
        ORDER BY version_number DESC, changed_at DESC
        "#,
    )
    .bind(dictionary_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
