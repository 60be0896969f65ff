//! Metadata store initialization
//!
//! Creates the connection pool and the fixed metadata tables. Canonical
//! tables (one per dictionary) are provisioned separately by
//! [`schema_sync`](crate::db::schema_sync) because their columns are
//! derived from dictionary terms at runtime.

use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Initialize the Postgres connection pool and metadata tables
pub async fn init_database_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the metadata tables if they don't exist
///
/// Both dictionary layers (USL master and local active) share one shape;
/// `datasource_id` stays NULL at the USL layer.
pub async fn init_tables(pool: &PgPool) -> Result<()> {
    for layer in ["dictionaries_usl", "dictionaries"] {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {layer} (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                version_number INTEGER NOT NULL DEFAULT 1,
                is_published BOOLEAN NOT NULL DEFAULT FALSE,
                datasource_id UUID,
                deleted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ))
        .execute(pool)
        .await?;
    }

    for layer in ["dictionary_terms_usl", "dictionary_terms"] {
        sqlx::query(&term_table_sql(layer)).execute(pool).await?;
        sqlx::query(&term_unique_index_sql(layer)).execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dictionary_change_log (
            id UUID PRIMARY KEY,
            dictionary_id UUID NOT NULL,
            term_id UUID,
            operation TEXT NOT NULL,
            old_value JSONB,
            new_value JSONB,
            version_number INTEGER NOT NULL,
            changed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_change_log_dictionary
        ON dictionary_change_log (dictionary_id, version_number)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS access_credentials (
            id UUID PRIMARY KEY,
            conn_string TEXT NOT NULL,
            name TEXT NOT NULL,
            conn_type TEXT NOT NULL,
            system TEXT,
            system_version TEXT,
            is_active BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS site_config (
            id UUID PRIMARY KEY,
            site_name TEXT NOT NULL,
            site_code TEXT NOT NULL,
            primary_system TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mapped_variables (
            id UUID PRIMARY KEY,
            tablename TEXT NOT NULL,
            columnname TEXT NOT NULL,
            datatype TEXT NOT NULL,
            base_repository TEXT NOT NULL,
            base_variable_mapped_to TEXT NOT NULL,
            join_by TEXT NOT NULL,
            source_system_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extracts_queries (
            id UUID PRIMARY KEY,
            query TEXT NOT NULL,
            base_repository TEXT NOT NULL,
            source_system_id UUID NOT NULL,
            is_custom BOOLEAN NOT NULL DEFAULT FALSE,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (base_repository, source_system_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transmission_history (
            id UUID PRIMARY KEY,
            usl_repository_name TEXT NOT NULL,
            action TEXT NOT NULL,
            facility TEXT NOT NULL,
            source_system_id UUID NOT NULL,
            source_system_name TEXT NOT NULL,
            manifest_id UUID,
            started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            ended_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dqa_reports (
            id UUID PRIMARY KEY,
            base_table_name TEXT NOT NULL,
            valid_rows BIGINT NOT NULL,
            invalid_rows BIGINT NOT NULL,
            null_rows BIGINT NOT NULL,
            total_rows BIGINT NOT NULL,
            dictionary_version INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Metadata tables initialized");

    Ok(())
}

fn term_table_sql(layer: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {layer} (
            id UUID PRIMARY KEY,
            dictionary TEXT NOT NULL,
            dictionary_id UUID NOT NULL,
            term TEXT NOT NULL,
            data_type TEXT NOT NULL,
            is_required BOOLEAN NOT NULL DEFAULT FALSE,
            term_description TEXT,
            expected_values TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            deleted_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
    )
}

/// Uniqueness of (dictionary, term) applies to live rows only, so a term
/// name can be re-added after a soft delete
fn term_unique_index_sql(layer: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_{layer}_dictionary_term \
         ON {layer} (dictionary, term) WHERE deleted_at IS NULL"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_uniqueness_excludes_soft_deleted_rows() {
        let index = term_unique_index_sql("dictionary_terms");
        assert!(index.contains("UNIQUE INDEX"));
        assert!(index.contains("(dictionary, term)"));
        assert!(index.ends_with("WHERE deleted_at IS NULL"));
        // The table itself carries no blanket constraint over the pair
        assert!(!term_table_sql("dictionary_terms").contains("UNIQUE"));
    }
}
