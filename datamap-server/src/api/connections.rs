//! Source-connection management endpoints
//!
//! Thin CRUD over `access_credentials` plus the atomic activate and a
//! connectivity probe. At most one connection is active at any time.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::active::{self, ConnectionInput};
use crate::error::{ApiError, ApiResult};
use crate::services::source::SourceReader;
use crate::AppState;
use datamap_common::db::models::AccessCredentials;

#[derive(Debug, Deserialize)]
pub struct ConnectionRequest {
    pub conn_string: String,
    pub name: String,
    pub conn_type: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub system_version: Option<String>,
}

const CONN_TYPES: &[&str] = &["mysql", "postgres", "mssql", "csv", "api"];

impl ConnectionRequest {
    fn into_input(self) -> Result<ConnectionInput, ApiError> {
        if !CONN_TYPES.contains(&self.conn_type.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "conn_type must be one of {:?}",
                CONN_TYPES
            )));
        }
        Ok(ConnectionInput {
            conn_string: self.conn_string,
            name: self.name,
            conn_type: self.conn_type,
            system: self.system,
            system_version: self.system_version,
        })
    }
}

/// GET /connections
pub async fn list_connections(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AccessCredentials>>> {
    Ok(Json(active::list_connections(&state.db).await?))
}

/// GET /connections/active
pub async fn get_active_connection(
    State(state): State<AppState>,
) -> ApiResult<Json<AccessCredentials>> {
    active::active_source(&state.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NoActiveSource)
}

/// POST /connections
pub async fn add_connection(
    State(state): State<AppState>,
    Json(request): Json<ConnectionRequest>,
) -> ApiResult<Json<AccessCredentials>> {
    let input = request.into_input()?;
    let saved = active::insert_connection(&state.db, &input).await?;
    tracing::info!(connection = %saved.name, conn_type = %saved.conn_type, "Connection registered");
    Ok(Json(saved))
}

/// PUT /connections/{id}
pub async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConnectionRequest>,
) -> ApiResult<Json<AccessCredentials>> {
    let input = request.into_input()?;
    Ok(Json(active::update_connection(&state.db, id, &input).await?))
}

/// POST /connections/{id}/activate
pub async fn activate_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AccessCredentials>> {
    let activated = active::activate_connection(&state.db, id).await?;
    tracing::info!(connection = %activated.name, "Connection activated");
    Ok(Json(activated))
}

/// DELETE /connections/{id}
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    active::delete_connection(&state.db, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// POST /connections/test - probe a connection before saving it
pub async fn test_connection(
    State(state): State<AppState>,
    Json(request): Json<ConnectionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let input = request.into_input()?;
    let probe = AccessCredentials {
        id: Uuid::new_v4(),
        conn_string: input.conn_string,
        name: input.name,
        conn_type: input.conn_type,
        system: input.system,
        system_version: input.system_version,
        is_active: false,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    let reader = SourceReader::connect(&probe, &state.db)
        .await
        .map_err(|e| {
            tracing::warn!(connection = %probe.name, error = %e, "Connection test failed");
            ApiError::SourceUnreachable
        })?;
    reader.test().await.map_err(|e| {
        tracing::warn!(connection = %probe.name, error = %e, "Connection test failed");
        ApiError::SourceUnreachable
    })?;

    Ok(Json(serde_json::json!({ "reachable": true })))
}

/// Build connection management routes
pub fn connection_routes() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_connections).post(add_connection))
        .route("/connections/active", get(get_active_connection))
        .route("/connections/test", post(test_connection))
        .route("/connections/:id", put(update_connection).delete(delete_connection))
        .route("/connections/:id/activate", post(activate_connection))
}
