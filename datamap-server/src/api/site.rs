//! Site (facility identity) management endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::active::{self, SiteInput};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use datamap_common::db::models::SiteConfig;

#[derive(Debug, Deserialize)]
pub struct SiteRequest {
    pub site_name: String,
    pub site_code: String,
    pub primary_system: String,
}

impl SiteRequest {
    fn into_input(self) -> Result<SiteInput, ApiError> {
        // site_code is interpolated into facility WHERE clauses as an integer
        if self.site_code.trim().parse::<i64>().is_err() {
            return Err(ApiError::BadRequest(format!(
                "site_code must be numeric, got '{}'",
                self.site_code
            )));
        }
        Ok(SiteInput {
            site_name: self.site_name,
            site_code: self.site_code.trim().to_string(),
            primary_system: self.primary_system,
        })
    }
}

/// GET /site
pub async fn list_sites(State(state): State<AppState>) -> ApiResult<Json<Vec<SiteConfig>>> {
    Ok(Json(active::list_sites(&state.db).await?))
}

/// GET /site/active
pub async fn get_active_site(State(state): State<AppState>) -> ApiResult<Json<SiteConfig>> {
    active::active_site(&state.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NoActiveSite)
}

/// POST /site
pub async fn add_site(
    State(state): State<AppState>,
    Json(request): Json<SiteRequest>,
) -> ApiResult<Json<SiteConfig>> {
    let input = request.into_input()?;
    let saved = active::insert_site(&state.db, &input).await?;
    tracing::info!(site = %saved.site_name, code = %saved.site_code, "Site registered");
    Ok(Json(saved))
}

/// PUT /site/{id}
pub async fn update_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SiteRequest>,
) -> ApiResult<Json<SiteConfig>> {
    let input = request.into_input()?;
    Ok(Json(active::update_site(&state.db, id, &input).await?))
}

/// POST /site/{id}/activate
pub async fn activate_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SiteConfig>> {
    let activated = active::activate_site(&state.db, id).await?;
    tracing::info!(site = %activated.site_name, "Site activated");
    Ok(Json(activated))
}

/// Build site management routes
pub fn site_routes() -> Router<AppState> {
    Router::new()
        .route("/site", get(list_sites).post(add_site))
        .route("/site/active", get(get_active_site))
        .route("/site/:id", put(update_site))
        .route("/site/:id/activate", post(activate_site))
}
