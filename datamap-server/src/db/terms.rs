//! Dictionary-term repository

use chrono::Utc;
use datamap_common::db::models::DictionaryTerm;
use datamap_common::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::DictionaryLayer;

/// Term fields supplied by callers on insert or edit
#[derive(Debug, Clone)]
pub struct TermInput {
    pub term: String,
    pub data_type: String,
    pub is_required: bool,
    pub term_description: Option<String>,
    pub expected_values: Option<String>,
    pub is_active: bool,
}

/// Active terms of a dictionary, by dictionary name
pub async fn list_for_dictionary(
    pool: &PgPool,
    layer: DictionaryLayer,
    dictionary: &str,
) -> Result<Vec<DictionaryTerm>> {
    let rows = sqlx::query_as::<_, DictionaryTerm>(&format!(
        "SELECT * FROM {} WHERE dictionary = $1 AND deleted_at IS NULL ORDER BY term",
        layer.terms_table()
    ))
    .bind(dictionary)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Every live term in a layer, for grouped dictionary listings
pub async fn list_all(pool: &PgPool, layer: DictionaryLayer) -> Result<Vec<DictionaryTerm>> {
    let rows = sqlx::query_as::<_, DictionaryTerm>(&format!(
        "SELECT * FROM {} WHERE deleted_at IS NULL ORDER BY dictionary, term",
        layer.terms_table()
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_by_id(
    pool: &PgPool,
    layer: DictionaryLayer,
    id: Uuid,
) -> Result<Option<DictionaryTerm>> {
    let row = sqlx::query_as::<_, DictionaryTerm>(&format!(
        "SELECT * FROM {} WHERE id = $1 AND deleted_at IS NULL",
        layer.terms_table()
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Insert a term; the (dictionary, term) pair is unique per layer
pub async fn insert(
    pool: &PgPool,
    layer: DictionaryLayer,
    dictionary: &str,
    dictionary_id: Uuid,
    input: &TermInput,
) -> Result<DictionaryTerm> {
    let row = sqlx::query_as::<_, DictionaryTerm>(&format!(
        r#"
        INSERT INTO {} (id, dictionary, dictionary_id, term, data_type, is_required,
                        term_description, expected_values, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
        layer.terms_table()
    ))
    .bind(Uuid::new_v4())
    .bind(dictionary)
    .bind(dictionary_id)
    .bind(input.term.to_lowercase())
    .bind(&input.data_type)
    .bind(input.is_required)
    .bind(&input.term_description)
    .bind(&input.expected_values)
    .bind(input.is_active)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::InvalidInput(format!(
            "Term '{}' already exists in dictionary '{}'",
            input.term, dictionary
        )),
        other => other.into(),
    })?;
    Ok(row)
}

/// Overwrite a term's editable fields, returning the updated row
pub async fn update(
    pool: &PgPool,
    layer: DictionaryLayer,
    id: Uuid,
    input: &TermInput,
) -> Result<DictionaryTerm> {
    let row = sqlx::query_as::<_, DictionaryTerm>(&format!(
        r#"
        UPDATE {} SET term = $2, data_type = $3, is_required = $4,
                      term_description = $5, expected_values = $6, is_active = $7,
                      updated_at = $8
        WHERE id = $1
        RETURNING *
        "#,
        layer.terms_table()
    ))
    .bind(id)
    .bind(input.term.to_lowercase())
    .bind(&input.data_type)
    .bind(input.is_required)
    .bind(&input.term_description)
    .bind(&input.expected_values)
    .bind(input.is_active)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::InvalidInput(format!(
            "Another term named '{}' already exists in this dictionary",
            input.term
        )),
        other => other.into(),
    })?
    .ok_or_else(|| Error::NotFound(format!("dictionary term {}", id)))?;
    Ok(row)
}

/// Soft-delete a term, returning the row as it stood before deletion
pub async fn soft_delete(
    pool: &PgPool,
    layer: DictionaryLayer,
    id: Uuid,
) -> Result<DictionaryTerm> {
    let row = find_by_id(pool, layer, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dictionary term {}", id)))?;

    sqlx::query(&format!(
        "UPDATE {} SET deleted_at = $2, is_active = FALSE, updated_at = $2 WHERE id = $1",
        layer.terms_table()
    ))
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(row)
}

/// Hard-delete every term of a dictionary (sync full-replace path)
pub async fn delete_for_dictionary(
    pool: &PgPool,
    layer: DictionaryLayer,
    dictionary_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE dictionary_id = $1",
        layer.terms_table()
    ))
    .bind(dictionary_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
