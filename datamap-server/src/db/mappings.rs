//! Mapped-variable repository
//!
//! Mappings for one (base repository, source system) pair are replaced as a
//! set: the UI posts the full mapping list and the previous set is dropped
//! in the same transaction.

use datamap_common::db::models::MappedVariable;
use datamap_common::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// One mapping row as posted by a caller (also the config-export shape)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MappingInput {
    pub tablename: String,
    pub columnname: String,
    pub datatype: String,
    pub base_variable_mapped_to: String,
    pub join_by: String,
}

impl MappingInput {
    /// Materialize a candidate row for query generation and validation
    /// without persisting it
    pub fn as_candidate(&self, base_repository: &str, source_system_id: Uuid) -> MappedVariable {
        MappedVariable {
            id: Uuid::new_v4(),
            tablename: self.tablename.clone(),
            columnname: self.columnname.clone(),
            datatype: self.datatype.clone(),
            base_repository: base_repository.to_string(),
            base_variable_mapped_to: self.base_variable_mapped_to.clone(),
            join_by: self.join_by.clone(),
            source_system_id,
            created_at: chrono::Utc::now(),
        }
    }
}

pub async fn list_for_repository(
    pool: &PgPool,
    base_repository: &str,
    source_system_id: Uuid,
) -> Result<Vec<MappedVariable>> {
    let rows = sqlx::query_as::<_, MappedVariable>(
        r#"
        SELECT * FROM mapped_variables
        WHERE base_repository = $1 AND source_system_id = $2
        ORDER BY base_variable_mapped_to
        "#,
    )
    .bind(base_repository)
    .bind(source_system_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replace the mapping set for one (repository, source system) pair
pub async fn replace_for_repository(
    pool: &PgPool,
    base_repository: &str,
    source_system_id: Uuid,
    inputs: &[MappingInput],
) -> Result<Vec<MappedVariable>> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM mapped_variables WHERE base_repository = $1 AND source_system_id = $2")
        .bind(base_repository)
        .bind(source_system_id)
        .execute(&mut *tx)
        .await?;

    let mut saved = Vec::with_capacity(inputs.len());
    for input in inputs {
        let row = sqlx::query_as::<_, MappedVariable>(
            r#"
            INSERT INTO mapped_variables
                (id, tablename, columnname, datatype, base_repository,
                 base_variable_mapped_to, join_by, source_system_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.tablename)
        .bind(&input.columnname)
        .bind(&input.datatype)
        .bind(base_repository)
        .bind(&input.base_variable_mapped_to)
        .bind(&input.join_by)
        .bind(source_system_id)
        .fetch_one(&mut *tx)
        .await?;
        saved.push(row);
    }

    tx.commit().await?;
    Ok(saved)
}
