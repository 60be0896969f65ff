//! Mapping configuration endpoints
//!
//! Column-to-term mapping per (base repository, active source), extraction
//! SQL generation and dry-run testing, custom query override, and
//! mapping-config export/import.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{self, mappings::MappingInput, DictionaryLayer};
use crate::error::{ApiError, ApiResult};
use crate::services::query_builder::{self, QueryBuildError};
use crate::services::source::SourceReader;
use crate::AppState;
use datamap_common::db::models::{AccessCredentials, MappedVariable, Record};

async fn require_active_source(state: &AppState) -> Result<AccessCredentials, ApiError> {
    db::active::active_source(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSource)
}

fn map_build_error(err: QueryBuildError) -> ApiError {
    ApiError::MappingIncomplete(err.to_string())
}

/// One source column as reported by information_schema
#[derive(Debug, Serialize)]
pub struct SourceColumn {
    pub table_name: String,
    pub column_name: String,
}

/// GET /mappings/source_columns - tables and columns of the active source
///
/// Live sources are introspected over the driver-agnostic connection;
/// flat-file sources report the staging table's columns.
pub async fn source_columns(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<SourceColumn>>> {
    let source = require_active_source(&state).await?;

    if source.is_flat_file() {
        let table = source.staging_table();
        let columns = datamap_common::db::schema_sync::SchemaIntrospector::column_names(
            &state.db, &table,
        )
        .await?;
        return Ok(Json(
            columns
                .into_iter()
                .map(|column_name| SourceColumn { table_name: table.clone(), column_name })
                .collect(),
        ));
    }

    let reader = SourceReader::connect(&source, &state.db)
        .await
        .map_err(|_| ApiError::SourceUnreachable)?;
    let rows = reader
        .fetch_records(
            "SELECT table_name, column_name FROM information_schema.columns \
             ORDER BY table_name, ordinal_position",
        )
        .await
        .map_err(|_| ApiError::SourceUnreachable)?;

    Ok(Json(
        rows.iter()
            .map(|r| SourceColumn {
                table_name: text_cell(r, "table_name"),
                column_name: text_cell(r, "column_name"),
            })
            .collect(),
    ))
}

fn text_cell(record: &Record, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// GET /mappings/{baselookup} - current mapping set
pub async fn list_mappings(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<Vec<MappedVariable>>> {
    let source = require_active_source(&state).await?;
    Ok(Json(
        db::mappings::list_for_repository(&state.db, &baselookup, source.id).await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct MappingSaveResponse {
    pub mappings: Vec<MappedVariable>,
    pub query: String,
    pub issues: Vec<String>,
}

/// POST /mappings/{baselookup} - full-replace the mapping set
///
/// Regenerates and caches the extraction query, unless a custom query
/// override is in force for this repository.
pub async fn add_mapped_variables(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
    Json(inputs): Json<Vec<MappingInput>>,
) -> ApiResult<Json<MappingSaveResponse>> {
    let source = require_active_source(&state).await?;
    let site = db::active::active_site(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSite)?;

    let saved =
        db::mappings::replace_for_repository(&state.db, &baselookup, source.id, &inputs).await?;

    let query = if source.is_flat_file() {
        query_builder::generate_flat_file_query(&baselookup, &saved, &source.staging_table())
    } else {
        query_builder::generate_query(&baselookup, &saved, &site.site_code)
    }
    .map_err(map_build_error)?;

    let custom_in_force = db::extract_queries::find(&state.db, &baselookup, source.id)
        .await?
        .map(|q| q.is_custom)
        .unwrap_or(false);
    if !custom_in_force {
        db::extract_queries::upsert(&state.db, &baselookup, source.id, &query, false).await?;
    }

    let terms =
        db::terms::list_for_dictionary(&state.db, DictionaryLayer::Local, &baselookup).await?;
    let issues = query_builder::validate_mandatory_fields(&terms, &saved, &[]);

    tracing::info!(
        repository = %baselookup,
        mappings = saved.len(),
        issues = issues.len(),
        "Mapping set replaced"
    );
    Ok(Json(MappingSaveResponse { mappings: saved, query, issues }))
}

#[derive(Debug, Serialize)]
pub struct TestMappingsResponse {
    pub query: String,
    pub sample: Vec<Record>,
    pub issues: Vec<String>,
}

/// POST /mappings/{baselookup}/test - dry-run a candidate mapping set
///
/// Takes the candidate mappings in the body, probes the source with the
/// generated query, and scans the fetched sample for empty or placeholder
/// values under every required term — nothing is persisted, so dirty data
/// surfaces before the set is committed.
pub async fn test_mapped_variables(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
    Json(inputs): Json<Vec<MappingInput>>,
) -> ApiResult<Json<TestMappingsResponse>> {
    let source = require_active_source(&state).await?;
    let site = db::active::active_site(&state.db)
        .await?
        .ok_or(ApiError::NoActiveSite)?;

    let candidates: Vec<_> = inputs
        .iter()
        .map(|i| i.as_candidate(&baselookup, source.id))
        .collect();
    let query = if source.is_flat_file() {
        query_builder::generate_flat_file_query(&baselookup, &candidates, &source.staging_table())
    } else {
        query_builder::generate_query(&baselookup, &candidates, &site.site_code)
    }
    .map_err(map_build_error)?;

    let reader = SourceReader::connect(&source, &state.db)
        .await
        .map_err(|_| ApiError::SourceUnreachable)?;
    let sample = reader
        .fetch_records(&query_builder::test_query(&query))
        .await
        .map_err(|_| ApiError::SourceUnreachable)?;

    let terms =
        db::terms::list_for_dictionary(&state.db, DictionaryLayer::Local, &baselookup).await?;
    let issues = query_builder::validate_mandatory_fields(&terms, &candidates, &sample);

    Ok(Json(TestMappingsResponse { query, sample, issues }))
}

#[derive(Debug, Deserialize)]
pub struct CustomQueryRequest {
    pub query: String,
}

/// POST /mappings/{baselookup}/query - custom query override
///
/// Stores the raw query flagged custom and replaces the mapping set with
/// placeholder rows so the mapping UI reflects the override.
pub async fn add_custom_query(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
    Json(request): Json<CustomQueryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let source = require_active_source(&state).await?;
    let terms =
        db::terms::list_for_dictionary(&state.db, DictionaryLayer::Local, &baselookup).await?;
    if terms.is_empty() {
        return Err(ApiError::NotFound(format!("dictionary '{}'", baselookup)));
    }

    let placeholders: Vec<MappingInput> = terms
        .iter()
        .filter(|t| t.is_active)
        .map(|t| MappingInput {
            tablename: "-".to_string(),
            columnname: "-".to_string(),
            datatype: t.data_type.clone(),
            base_variable_mapped_to: t.term.clone(),
            join_by: "-".to_string(),
        })
        .collect();
    db::mappings::replace_for_repository(&state.db, &baselookup, source.id, &placeholders)
        .await?;

    let saved =
        db::extract_queries::upsert(&state.db, &baselookup, source.id, &request.query, true)
            .await?;

    tracing::info!(repository = %baselookup, "Custom extraction query stored");
    Ok(Json(serde_json::json!({
        "base_repository": saved.base_repository,
        "is_custom": saved.is_custom,
    })))
}

#[derive(Debug, Serialize)]
pub struct TestCustomQueryResponse {
    pub columns: Vec<String>,
    pub sample: Vec<Record>,
    pub issues: Vec<String>,
}

/// POST /mappings/{baselookup}/query/test - probe a custom query
///
/// Runs a LIMIT probe against the source and checks the result columns
/// against the dictionary term set (missing and unexpected both reported).
pub async fn test_custom_query(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
    Json(request): Json<CustomQueryRequest>,
) -> ApiResult<Json<TestCustomQueryResponse>> {
    let source = require_active_source(&state).await?;
    let terms =
        db::terms::list_for_dictionary(&state.db, DictionaryLayer::Local, &baselookup).await?;

    let reader = SourceReader::connect(&source, &state.db)
        .await
        .map_err(|_| ApiError::SourceUnreachable)?;
    let sample = reader
        .fetch_records(&query_builder::test_query(&request.query))
        .await
        .map_err(|e| {
            tracing::warn!(repository = %baselookup, error = %e, "Custom query probe failed");
            ApiError::BadRequest("Custom query failed against the source".to_string())
        })?;

    let mut columns: Vec<String> = sample
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();
    columns.sort();

    let issues = query_builder::validate_custom_columns(&terms, &columns);
    Ok(Json(TestCustomQueryResponse { columns, sample, issues }))
}

/// Portable mapping configuration document
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingConfig {
    pub base_repository: String,
    pub query: String,
    #[serde(default)]
    pub is_custom: bool,
    pub mappings: Vec<MappingInput>,
}

/// GET /mappings/config/{baselookup} - export the mapping configuration
pub async fn export_config(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> ApiResult<Json<MappingConfig>> {
    let source = require_active_source(&state).await?;
    let mappings =
        db::mappings::list_for_repository(&state.db, &baselookup, source.id).await?;
    if mappings.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no mappings exist for '{}'",
            baselookup
        )));
    }
    let cached = db::extract_queries::find(&state.db, &baselookup, source.id).await?;

    Ok(Json(MappingConfig {
        base_repository: baselookup,
        query: cached.as_ref().map(|q| q.query.clone()).unwrap_or_default(),
        is_custom: cached.map(|q| q.is_custom).unwrap_or(false),
        mappings: mappings
            .into_iter()
            .map(|m| MappingInput {
                tablename: m.tablename,
                columnname: m.columnname,
                datatype: m.datatype,
                base_variable_mapped_to: m.base_variable_mapped_to,
                join_by: m.join_by,
            })
            .collect(),
    }))
}

/// POST /mappings/config/import - replace mappings and query from a document
pub async fn import_config(
    State(state): State<AppState>,
    Json(config): Json<MappingConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    let source = require_active_source(&state).await?;

    let saved = db::mappings::replace_for_repository(
        &state.db,
        &config.base_repository,
        source.id,
        &config.mappings,
    )
    .await?;
    if !config.query.is_empty() {
        db::extract_queries::upsert(
            &state.db,
            &config.base_repository,
            source.id,
            &config.query,
            config.is_custom,
        )
        .await?;
    }

    tracing::info!(
        repository = %config.base_repository,
        mappings = saved.len(),
        "Mapping configuration imported"
    );
    Ok(Json(serde_json::json!({
        "base_repository": config.base_repository,
        "imported_mappings": saved.len(),
    })))
}

/// Build mapping routes
pub fn mapping_routes() -> Router<AppState> {
    Router::new()
        .route("/mappings/source_columns", get(source_columns))
        .route("/mappings/config/import", post(import_config))
        .route("/mappings/config/:baselookup", get(export_config))
        .route("/mappings/:baselookup", get(list_mappings).post(add_mapped_variables))
        .route("/mappings/:baselookup/test", post(test_mapped_variables))
        .route("/mappings/:baselookup/query", post(add_custom_query))
        .route("/mappings/:baselookup/query/test", post(test_custom_query))
}
