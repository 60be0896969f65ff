//! Transmission-history repository
//!
//! Load and send runs each open a history row (Loading / Sending) and close
//! it on success by back-filling `ended_at` and flipping the action to its
//! completed form (Loaded / Sent). A row with no `ended_at` is a run that
//! failed or is still in flight.

use chrono::Utc;
use datamap_common::db::models::{TransmissionAction, TransmissionHistory};
use datamap_common::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Open a history row for a starting run
pub async fn open(
    pool: &PgPool,
    usl_repository_name: &str,
    action: TransmissionAction,
    facility: &str,
    source_system_id: Uuid,
    source_system_name: &str,
    manifest_id: Option<Uuid>,
) -> Result<TransmissionHistory> {
    let row = sqlx::query_as::<_, TransmissionHistory>(
        r#"
        INSERT INTO transmission_history
            (id, usl_repository_name, action, facility, source_system_id,
             source_system_name, manifest_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(usl_repository_name)
    .bind(action.as_str())
    .bind(facility)
    .bind(source_system_id)
    .bind(source_system_name)
    .bind(manifest_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Close a history row: flip the action and stamp `ended_at`
pub async fn close(pool: &PgPool, id: Uuid, action: TransmissionAction) -> Result<()> {
    let result = sqlx::query(
        "UPDATE transmission_history SET action = $2, ended_at = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(action.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("transmission history {}", id)));
    }
    Ok(())
}

/// Close the history row a manifest opened, by its manifest id
pub async fn close_by_manifest(
    pool: &PgPool,
    manifest_id: Uuid,
    action: TransmissionAction,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE transmission_history SET action = $2, ended_at = $3 WHERE manifest_id = $1",
    )
    .bind(manifest_id)
    .bind(action.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("manifest {}", manifest_id)));
    }
    Ok(())
}

/// Full history for one repository, newest first
pub async fn list_for_repository(
    pool: &PgPool,
    usl_repository_name: &str,
) -> Result<Vec<TransmissionHistory>> {
    let rows = sqlx::query_as::<_, TransmissionHistory>(
        r#"
        SELECT * FROM transmission_history
        WHERE usl_repository_name = $1
        ORDER BY started_at DESC
        "#,
    )
    .bind(usl_repository_name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
