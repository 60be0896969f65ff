//! DQA endpoints: synchronous runs and report history

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db;
use crate::error::ApiResult;
use crate::services::dqa::{dqa_check, DqaRunResult};
use crate::AppState;
use datamap_common::db::models::DqaReport;

/// GET /dqa/{baselookup} - run a full validation pass now
///
/// Synchronous by design: the caller gets per-row failure detail plus the
/// aggregate report in one response.
pub async fn run_dqa(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<DqaRunResult>> {
    let result = dqa_check(&state.db, &baselookup).await?;
    Ok(Json(result))
}

/// GET /dqa/reports - latest report per canonical table
pub async fn latest_reports(State(state): State<AppState>) -> ApiResult<Json<Vec<DqaReport>>> {
    Ok(Json(db::dqa_reports::latest_per_table(&state.db).await?))
}

/// GET /dqa/reports/{baselookup} - full report history for one table
pub async fn table_reports(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<Vec<DqaReport>>> {
    Ok(Json(
        db::dqa_reports::list_for_table(&state.db, &baselookup).await?,
    ))
}

/// Build DQA routes
pub fn dqa_routes() -> Router<AppState> {
    Router::new()
        .route("/dqa/reports", get(latest_reports))
        .route("/dqa/reports/:baselookup", get(table_reports))
        .route("/dqa/:baselookup", get(run_dqa))
}
