//! Transmission endpoints: manifest generation and batch sending
//!
//! Manifest-then-batches protocol: the client fetches the manifest, then
//! POSTs it back to start the send run. Progress streams over
//! `/events/{baselookup}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::transmission::{build_manifest, spawn_send, Manifest};
use crate::AppState;
use datamap_common::db::models::TransmissionHistory;

/// GET /transmission/manifest/repository/{baselookup}
pub async fn get_manifest(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<Manifest>> {
    db::active::active_source(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSource)?;
    db::active::active_site(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSite)?;

    let manifest = build_manifest(&state, &baselookup).await?;
    tracing::info!(
        repository = %baselookup,
        manifest_id = %manifest.manifest_id,
        total_rows = manifest.total_rows,
        "Manifest generated"
    );
    Ok(Json(manifest))
}

#[derive(Debug, Serialize)]
pub struct SendTriggerResponse {
    pub repository: String,
    pub manifest_id: Uuid,
    pub total_batches: usize,
    pub status: String,
}

/// POST /transmission/send/{baselookup} - start sending a manifest's batches
pub async fn trigger_send(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
    Json(manifest): Json<Manifest>,
) -> ApiResult<(StatusCode, Json<SendTriggerResponse>)> {
    if manifest.repository != baselookup {
        return Err(ApiError::BadRequest(format!(
            "Manifest is for '{}', not '{}'",
            manifest.repository, baselookup
        )));
    }

    if !state.claim_run(&baselookup).await {
        return Err(ApiError::Conflict(format!(
            "A run for '{}' is already in progress",
            baselookup
        )));
    }

    let response = SendTriggerResponse {
        repository: baselookup,
        manifest_id: manifest.manifest_id,
        total_batches: manifest.total_batches,
        status: "started".to_string(),
    };
    tracing::info!(
        repository = %response.repository,
        manifest_id = %response.manifest_id,
        "Send run triggered"
    );
    spawn_send(state, manifest);

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /transmission/history/{baselookup} - load/send history, newest first
pub async fn history(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<Vec<TransmissionHistory>>> {
    Ok(Json(
        db::history::list_for_repository(&state.db, &baselookup).await?,
    ))
}

/// Build transmission routes
pub fn transmission_routes() -> Router<AppState> {
    Router::new()
        .route("/transmission/manifest/repository/:baselookup", get(get_manifest))
        .route("/transmission/send/:baselookup", post(trigger_send))
        .route("/transmission/history/:baselookup", get(history))
}
