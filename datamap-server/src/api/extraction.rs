//! Extraction/load trigger and status endpoints
//!
//! The trigger returns 202 and runs the load in a background task; progress
//! streams over `/events/{baselookup}`. One run per repository at a time.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::{self, DictionaryLayer};
use crate::error::{ApiError, ApiResult};
use crate::services::extraction::spawn_load;
use crate::AppState;
use datamap_common::db::models::TransmissionHistory;

#[derive(Debug, Serialize)]
pub struct LoadTriggerResponse {
    pub repository: String,
    pub status: String,
}

/// POST /extraction/load/{baselookup} - trigger one load run
pub async fn trigger_load(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<(StatusCode, Json<LoadTriggerResponse>)> {
    if db::dictionaries::find_by_name(&state.db, DictionaryLayer::Local, &baselookup)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!("dictionary '{}'", baselookup)));
    }
    db::active::active_source(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSource)?;
    db::active::active_site(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSite)?;

    if !state.claim_run(&baselookup).await {
        return Err(ApiError::Conflict(format!(
            "A run for '{}' is already in progress",
            baselookup
        )));
    }

    tracing::info!(repository = %baselookup, "Load run triggered");
    spawn_load(state, baselookup.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(LoadTriggerResponse {
            repository: baselookup,
            status: "started".to_string(),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct LoadStatusResponse {
    pub repository: String,
    pub running: bool,
    pub latest: Option<TransmissionHistory>,
}

/// GET /extraction/load/status/{baselookup} - latest run state
pub async fn load_status(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<LoadStatusResponse>> {
    let running = state.active_runs.read().await.contains(&baselookup);
    let latest = db::history::list_for_repository(&state.db, &baselookup)
        .await?
        .into_iter()
        .next();

    Ok(Json(LoadStatusResponse { repository: baselookup, running, latest }))
}

/// Build extraction routes
pub fn extraction_routes() -> Router<AppState> {
    Router::new()
        .route("/extraction/load/:baselookup", post(trigger_load))
        .route("/extraction/load/status/:baselookup", get(load_status))
}
