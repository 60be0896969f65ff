//! Dictionary repository, parameterized over the USL and local layers

use chrono::Utc;
use datamap_common::db::models::Dictionary;
use datamap_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// The two dictionary stores: the publishable master layer (USL) and the
/// locally active layer owned by a datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryLayer {
    Usl,
    Local,
}

impl DictionaryLayer {
    pub fn dictionaries_table(&self) -> &'static str {
        match self {
            DictionaryLayer::Usl => "dictionaries_usl",
            DictionaryLayer::Local => "dictionaries",
        }
    }

    pub fn terms_table(&self) -> &'static str {
        match self {
            DictionaryLayer::Usl => "dictionary_terms_usl",
            DictionaryLayer::Local => "dictionary_terms",
        }
    }
}

/// All live dictionaries in one layer
pub async fn list(pool: &PgPool, layer: DictionaryLayer) -> Result<Vec<Dictionary>> {
    let rows = sqlx::query_as::<_, Dictionary>(&format!(
        "SELECT * FROM {} WHERE deleted_at IS NULL ORDER BY name",
        layer.dictionaries_table()
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Look a dictionary up by exact name
pub async fn find_by_name(
    pool: &PgPool,
    layer: DictionaryLayer,
    name: &str,
) -> Result<Option<Dictionary>> {
    let row = sqlx::query_as::<_, Dictionary>(&format!(
        "SELECT * FROM {} WHERE name = $1 AND deleted_at IS NULL",
        layer.dictionaries_table()
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Local dictionaries owned by one datasource
pub async fn list_for_datasource(pool: &PgPool, datasource_id: Uuid) -> Result<Vec<Dictionary>> {
    let rows = sqlx::query_as::<_, Dictionary>(
        "SELECT * FROM dictionaries WHERE datasource_id = $1 AND deleted_at IS NULL",
    )
    .bind(datasource_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert a dictionary; names are stored lowercased
pub async fn insert(
    pool: &PgPool,
    layer: DictionaryLayer,
    name: &str,
    version_number: i32,
    is_published: bool,
    datasource_id: Option<Uuid>,
) -> Result<Dictionary> {
    let row = sqlx::query_as::<_, Dictionary>(&format!(
        r#"
        INSERT INTO {} (id, name, version_number, is_published, datasource_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
        layer.dictionaries_table()
    ))
    .bind(Uuid::new_v4())
    .bind(name.to_lowercase())
    .bind(version_number)
    .bind(is_published)
    .bind(datasource_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Overwrite version and publication state in place (last-writer-wins)
pub async fn update_version_published(
    pool: &PgPool,
    layer: DictionaryLayer,
    id: Uuid,
    version_number: i32,
    is_published: bool,
) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {} SET version_number = $2, is_published = $3, updated_at = $4 WHERE id = $1",
        layer.dictionaries_table()
    ))
    .bind(id)
    .bind(version_number)
    .bind(is_published)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Strictly increase the version by one, returning the new value
pub async fn bump_version(pool: &PgPool, layer: DictionaryLayer, id: Uuid) -> Result<i32> {
    let version: i32 = sqlx::query_scalar(&format!(
        r#"
        UPDATE {} SET version_number = version_number + 1, updated_at = $2
        WHERE id = $1
        RETURNING version_number
        "#,
        layer.dictionaries_table()
    ))
    .bind(id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(version)
}

/// Hard delete, terms included — used by sync when a local dictionary is no
/// longer present in the remote set
pub async fn delete_with_terms(pool: &PgPool, layer: DictionaryLayer, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(&format!(
        "DELETE FROM {} WHERE dictionary_id = $1",
        layer.terms_table()
    ))
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!(
        "DELETE FROM {} WHERE id = $1",
        layer.dictionaries_table()
    ))
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
