//! Active-configuration store: source connections and site identity
//!
//! Both tables share the single-active invariant. Activation clears the
//! previous active row and sets the new one inside one transaction, so a
//! reader never observes zero or two active rows mid-switch.

use chrono::Utc;
use datamap_common::db::models::{AccessCredentials, SiteConfig};
use datamap_common::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Fields supplied when registering or editing a connection
#[derive(Debug, Clone)]
pub struct ConnectionInput {
    pub conn_string: String,
    pub name: String,
    pub conn_type: String,
    pub system: Option<String>,
    pub system_version: Option<String>,
}

pub async fn list_connections(pool: &PgPool) -> Result<Vec<AccessCredentials>> {
    let rows = sqlx::query_as::<_, AccessCredentials>(
        "SELECT * FROM access_credentials ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_connection(pool: &PgPool, id: Uuid) -> Result<Option<AccessCredentials>> {
    let row = sqlx::query_as::<_, AccessCredentials>(
        "SELECT * FROM access_credentials WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The single active source connection, if one is configured
pub async fn active_source(pool: &PgPool) -> Result<Option<AccessCredentials>> {
    let row = sqlx::query_as::<_, AccessCredentials>(
        "SELECT * FROM access_credentials WHERE is_active = TRUE",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Register a connection; the first connection registered becomes active
pub async fn insert_connection(pool: &PgPool, input: &ConnectionInput) -> Result<AccessCredentials> {
    let any_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM access_credentials)")
            .fetch_one(pool)
            .await?;

    let row = sqlx::query_as::<_, AccessCredentials>(
        r#"
        INSERT INTO access_credentials
            (id, conn_string, name, conn_type, system, system_version, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&input.conn_string)
    .bind(&input.name)
    .bind(&input.conn_type)
    .bind(&input.system)
    .bind(&input.system_version)
    .bind(!any_exists)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn update_connection(
    pool: &PgPool,
    id: Uuid,
    input: &ConnectionInput,
) -> Result<AccessCredentials> {
    let row = sqlx::query_as::<_, AccessCredentials>(
        r#"
        UPDATE access_credentials
        SET conn_string = $2, name = $3, conn_type = $4, system = $5,
            system_version = $6, updated_at = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&input.conn_string)
    .bind(&input.name)
    .bind(&input.conn_type)
    .bind(&input.system)
    .bind(&input.system_version)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("connection {}", id)))?;
    Ok(row)
}

/// Atomically make one connection the active source
pub async fn activate_connection(pool: &PgPool, id: Uuid) -> Result<AccessCredentials> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE access_credentials SET is_active = FALSE WHERE is_active = TRUE")
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, AccessCredentials>(
        r#"
        UPDATE access_credentials SET is_active = TRUE, updated_at = $2
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("connection {}", id)))?;

    tx.commit().await?;
    Ok(row)
}

pub async fn delete_connection(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM access_credentials WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("connection {}", id)));
    }
    Ok(())
}

/// Fields supplied when registering or editing the site identity
#[derive(Debug, Clone)]
pub struct SiteInput {
    pub site_name: String,
    pub site_code: String,
    pub primary_system: String,
}

pub async fn list_sites(pool: &PgPool) -> Result<Vec<SiteConfig>> {
    let rows = sqlx::query_as::<_, SiteConfig>("SELECT * FROM site_config ORDER BY created_at")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// The single active site configuration, if one is set
pub async fn active_site(pool: &PgPool) -> Result<Option<SiteConfig>> {
    let row = sqlx::query_as::<_, SiteConfig>("SELECT * FROM site_config WHERE is_active = TRUE")
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Register a site; the first site registered becomes active
pub async fn insert_site(pool: &PgPool, input: &SiteInput) -> Result<SiteConfig> {
    let any_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM site_config)")
        .fetch_one(pool)
        .await?;

    let row = sqlx::query_as::<_, SiteConfig>(
        r#"
        INSERT INTO site_config (id, site_name, site_code, primary_system, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&input.site_name)
    .bind(&input.site_code)
    .bind(&input.primary_system)
    .bind(!any_exists)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn update_site(pool: &PgPool, id: Uuid, input: &SiteInput) -> Result<SiteConfig> {
    let row = sqlx::query_as::<_, SiteConfig>(
        r#"
        UPDATE site_config
        SET site_name = $2, site_code = $3, primary_system = $4, updated_at = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&input.site_name)
    .bind(&input.site_code)
    .bind(&input.primary_system)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("site {}", id)))?;
    Ok(row)
}

/// Atomically make one site the active facility identity
pub async fn activate_site(pool: &PgPool, id: Uuid) -> Result<SiteConfig> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE site_config SET is_active = FALSE WHERE is_active = TRUE")
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, SiteConfig>(
        r#"
        UPDATE site_config SET is_active = TRUE, updated_at = $2
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("site {}", id)))?;

    tx.commit().await?;
    Ok(row)
}
