//! Dictionary and term endpoints
//!
//! Listing covers both layers; manual term mutations operate on the USL
//! layer (the master set) and flow to the local layer through sync. Every
//! mutating call bumps the dictionary version exactly once and appends one
//! change-log row per term touched.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, terms::TermInput, DictionaryLayer};
use crate::error::{ApiError, ApiResult};
use crate::services::dictionary_sync::{self, SyncSummary, VersionNotification};
use crate::services::universal_dictionary::UniversalDictionaryClient;
use crate::AppState;
use datamap_common::db::models::{
    ChangeOperation, Dictionary, DictionaryChangeLog, DictionaryTerm,
};
use datamap_common::db::schema_sync::ensure_safe_ident;

#[derive(Debug, Deserialize)]
pub struct LayerQuery {
    #[serde(default)]
    pub layer: Option<String>,
}

fn resolve_layer(query: &LayerQuery) -> Result<DictionaryLayer, ApiError> {
    match query.layer.as_deref() {
        None | Some("local") => Ok(DictionaryLayer::Local),
        Some("usl") => Ok(DictionaryLayer::Usl),
        Some(other) => Err(ApiError::BadRequest(format!(
            "layer must be 'usl' or 'local', got '{}'",
            other
        ))),
    }
}

/// One dictionary with its terms, for grouped listings
#[derive(Debug, serde::Serialize)]
pub struct DictionaryWithTerms {
    #[serde(flatten)]
    pub dictionary: Dictionary,
    pub terms: Vec<DictionaryTerm>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDictionaryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TermRequest {
    pub term: String,
    pub data_type: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub term_description: Option<String>,
    #[serde(default)]
    pub expected_values: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TermRequest {
    fn into_input(self) -> Result<TermInput, ApiError> {
        // Term names become canonical-table columns
        ensure_safe_ident(&self.term.to_lowercase())
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(TermInput {
            term: self.term,
            data_type: self.data_type,
            is_required: self.is_required,
            term_description: self.term_description,
            expected_values: self.expected_values,
            is_active: self.is_active,
        })
    }
}

/// GET /dictionaries?layer=usl|local - dictionaries grouped with their terms
pub async fn list_dictionaries(
    State(state): State<AppState>,
    Query(query): Query<LayerQuery>,
) -> ApiResult<Json<Vec<DictionaryWithTerms>>> {
    let layer = resolve_layer(&query)?;
    let dictionaries = db::dictionaries::list(&state.db, layer).await?;

    let mut terms_by_dict: std::collections::HashMap<String, Vec<DictionaryTerm>> =
        std::collections::HashMap::new();
    for term in db::terms::list_all(&state.db, layer).await? {
        terms_by_dict.entry(term.dictionary.clone()).or_default().push(term);
    }

    let grouped = dictionaries
        .into_iter()
        .map(|dictionary| {
            let terms = terms_by_dict.remove(&dictionary.name).unwrap_or_default();
            DictionaryWithTerms { dictionary, terms }
        })
        .collect();

    Ok(Json(grouped))
}

/// POST /dictionaries - create a USL dictionary
pub async fn create_dictionary(
    State(state): State<AppState>,
    Json(request): Json<CreateDictionaryRequest>,
) -> ApiResult<Json<Dictionary>> {
    let name = request.name.to_lowercase();
    ensure_safe_ident(&name).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if db::dictionaries::find_by_name(&state.db, DictionaryLayer::Usl, &name)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "Dictionary '{}' already exists",
            name
        )));
    }

    let created =
        db::dictionaries::insert(&state.db, DictionaryLayer::Usl, &name, 1, false, None).await?;
    tracing::info!(dictionary = %created.name, "Dictionary created");
    Ok(Json(created))
}

/// POST /dictionaries/{name}/terms - add terms, one version bump per call
pub async fn add_terms(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(requests): Json<Vec<TermRequest>>,
) -> ApiResult<Json<Vec<DictionaryTerm>>> {
    if requests.is_empty() {
        return Err(ApiError::BadRequest("No terms supplied".to_string()));
    }

    let layer = DictionaryLayer::Usl;
    let dictionary = db::dictionaries::find_by_name(&state.db, layer, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dictionary '{}'", name)))?;

    let version = db::dictionaries::bump_version(&state.db, layer, dictionary.id).await?;

    let mut added = Vec::with_capacity(requests.len());
    for request in requests {
        let input = request.into_input()?;
        let term =
            db::terms::insert(&state.db, layer, &dictionary.name, dictionary.id, &input).await?;
        db::change_log::append(
            &state.db,
            dictionary.id,
            Some(term.id),
            ChangeOperation::Add,
            None,
            Some(&term),
            version,
        )
        .await?;
        added.push(term);
    }

    Ok(Json(added))
}

/// PUT /dictionaries/terms/{term_id} - edit one term
pub async fn edit_term(
    State(state): State<AppState>,
    Path(term_id): Path<Uuid>,
    Json(request): Json<TermRequest>,
) -> ApiResult<Json<DictionaryTerm>> {
    let layer = DictionaryLayer::Usl;
    let before = db::terms::find_by_id(&state.db, layer, term_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("term {}", term_id)))?;

    let input = request.into_input()?;
    let after = db::terms::update(&state.db, layer, term_id, &input).await?;
    let version = db::dictionaries::bump_version(&state.db, layer, before.dictionary_id).await?;
    db::change_log::append(
        &state.db,
        before.dictionary_id,
        Some(term_id),
        ChangeOperation::Edit,
        Some(&before),
        Some(&after),
        version,
    )
    .await?;

    Ok(Json(after))
}

/// DELETE /dictionaries/terms/{term_id} - soft-delete one term
pub async fn delete_term(
    State(state): State<AppState>,
    Path(term_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let layer = DictionaryLayer::Usl;
    let removed = db::terms::soft_delete(&state.db, layer, term_id).await?;
    let version = db::dictionaries::bump_version(&state.db, layer, removed.dictionary_id).await?;
    db::change_log::append(
        &state.db,
        removed.dictionary_id,
        Some(term_id),
        ChangeOperation::Delete,
        Some(&removed),
        None,
        version,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "deleted": term_id,
        "version_number": version,
    })))
}

/// One version's worth of change-log entries
#[derive(Debug, serde::Serialize)]
pub struct VersionChanges {
    pub version_number: i32,
    pub changes: Vec<DictionaryChangeLog>,
}

/// GET /dictionaries/{name}/change_log - history grouped by version
pub async fn change_log(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LayerQuery>,
) -> ApiResult<Json<Vec<VersionChanges>>> {
    let layer = resolve_layer(&query)?;
    let dictionary = db::dictionaries::find_by_name(&state.db, layer, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dictionary '{}'", name)))?;

    let entries = db::change_log::list_for_dictionary(&state.db, dictionary.id).await?;

    // Entries arrive newest-version-first; fold consecutive runs
    let mut groups: Vec<VersionChanges> = Vec::new();
    for entry in entries {
        match groups.last_mut() {
            Some(group) if group.version_number == entry.version_number => {
                group.changes.push(entry)
            }
            _ => groups.push(VersionChanges {
                version_number: entry.version_number,
                changes: vec![entry],
            }),
        }
    }

    Ok(Json(groups))
}

/// GET /dictionaries/sync_all/{datasource_id} - mirror the master set
pub async fn sync_all(
    State(state): State<AppState>,
    Path(datasource_id): Path<Uuid>,
) -> ApiResult<Json<SyncSummary>> {
    if db::active::find_connection(&state.db, datasource_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("connection {}", datasource_id)));
    }

    let client = UniversalDictionaryClient::from_settings(&state.settings);
    let summary = dictionary_sync::sync_all(&state.db, client.as_ref(), datasource_id).await?;
    Ok(Json(summary))
}

/// GET /dictionaries/version_notification - drift detector for the active source
pub async fn version_notification(
    State(state): State<AppState>,
) -> ApiResult<Json<VersionNotification>> {
    let source = db::active::active_source(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSource)?;

    let client = UniversalDictionaryClient::from_settings(&state.settings);
    let notification =
        dictionary_sync::version_notification(&state.db, client.as_ref(), source.id).await?;
    Ok(Json(notification))
}

/// Build dictionary routes
pub fn dictionary_routes() -> Router<AppState> {
    Router::new()
        .route("/dictionaries", get(list_dictionaries).post(create_dictionary))
        .route("/dictionaries/version_notification", get(version_notification))
        .route("/dictionaries/sync_all/:datasource_id", get(sync_all))
        .route("/dictionaries/terms/:term_id", put(edit_term).delete(delete_term))
        .route("/dictionaries/:name/terms", post(add_terms))
        .route("/dictionaries/:name/change_log", get(change_log))
}
