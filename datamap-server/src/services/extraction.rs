//! Extraction/load engine
//!
//! One run pulls the full extract from the active source, coerces every
//! cell to its term's type, batches inserts into a shadow table, then swaps
//! the shadow in atomically. Readers of the canonical table never see a
//! half-loaded state; a failed run leaves the previous table untouched.
//!
//! Progress is emitted on the event bus per batch; a DQA pass runs
//! automatically after a successful swap.

use chrono::Utc;
use datamap_common::db::models::{Record, TransmissionAction};
use datamap_common::db::schema_sync::{CanonicalColumn, CanonicalTableSpec, SchemaSync};
use datamap_common::events::DataMapEvent;
use datamap_common::{Error, Result};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{self, DictionaryLayer};
use crate::services::coercion::coerce_value;
use crate::services::query_builder;
use crate::services::source::SourceReader;
use crate::AppState;

/// Trigger one load run in the background
///
/// The repository must already be claimed via [`AppState::claim_run`]; the
/// claim is released when the run completes or fails.
pub fn spawn_load(state: AppState, baselookup: String) {
    tokio::spawn(async move {
        let result = execute_load(&state, &baselookup).await;
        match result {
            Ok(total_rows) => {
                let _ = state.event_bus.emit(DataMapEvent::LoadCompleted {
                    repository: baselookup.clone(),
                    total_rows,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                error!(repository = %baselookup, error = %e, "Load run failed");
                let _ = state.event_bus.emit(DataMapEvent::LoadFailed {
                    repository: baselookup.clone(),
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        state.release_run(&baselookup).await;
    });
}

async fn execute_load(state: &AppState, baselookup: &str) -> Result<usize> {
    let pool = &state.db;

    let source = db::active::active_source(pool)
        .await?
        .ok_or_else(|| Error::InvalidInput("No active source connection".to_string()))?;
    let site = db::active::active_site(pool)
        .await?
        .ok_or_else(|| Error::InvalidInput("No active site configuration".to_string()))?;

    let terms = db::terms::list_for_dictionary(pool, DictionaryLayer::Local, baselookup).await?;
    if terms.is_empty() {
        return Err(Error::NotFound(format!("dictionary '{}'", baselookup)));
    }
    let spec = CanonicalTableSpec::from_terms(baselookup, &terms)?;

    let query = resolve_query(state, baselookup, &source, &site.site_code).await?;

    let history = db::history::open(
        pool,
        baselookup,
        TransmissionAction::Loading,
        &site.site_name,
        source.id,
        &source.name,
        None,
    )
    .await?;

    let reader = SourceReader::connect(&source, pool).await?;
    let records = reader.fetch_records(&query).await?;
    info!(repository = %baselookup, rows = records.len(), "Source extract fetched");

    let shadow = SchemaSync::create_shadow_table(pool, &spec).await?;
    let id_column = spec.id_column();

    let mut inserted = 0usize;
    for chunk in records.chunks(state.settings.load_batch_size) {
        let prepared: Vec<Record> = chunk
            .iter()
            .map(|r| prepare_record(r, &spec.columns, &id_column))
            .collect();
        inserted += db::canonical::insert_batch(pool, &spec, &shadow, &prepared).await? as usize;

        let _ = state.event_bus.emit(DataMapEvent::LoadProgress {
            repository: baselookup.to_string(),
            count_inserted: inserted,
            timestamp: Utc::now(),
        });
    }

    SchemaSync::swap_shadow_table(pool, &spec).await?;
    db::history::close(pool, history.id, TransmissionAction::Loaded).await?;

    // DQA runs automatically against the freshly loaded table; an
    // infrastructure failure there does not undo the load
    if let Err(e) = crate::services::dqa::dqa_check(pool, baselookup).await {
        warn!(repository = %baselookup, error = %e, "Post-load DQA run failed");
    }

    Ok(inserted)
}

/// Resolve the extraction SQL: cached query first, else generate and cache
async fn resolve_query(
    state: &AppState,
    baselookup: &str,
    source: &datamap_common::db::models::AccessCredentials,
    site_code: &str,
) -> Result<String> {
    if let Some(cached) = db::extract_queries::find(&state.db, baselookup, source.id).await? {
        return Ok(cached.query);
    }

    let mappings = db::mappings::list_for_repository(&state.db, baselookup, source.id).await?;
    let query = if source.is_flat_file() {
        query_builder::generate_flat_file_query(baselookup, &mappings, &source.staging_table())
    } else {
        query_builder::generate_query(baselookup, &mappings, site_code)
    }
    .map_err(|e| Error::InvalidInput(e.to_string()))?;

    db::extract_queries::upsert(&state.db, baselookup, source.id, &query, false).await?;
    Ok(query)
}

/// Coerce one source record into canonical shape
///
/// Keys are already lower-cased by the source reader; cells are coerced per
/// term type, unknown columns dropped, and the `{table}_id` row id stamped.
pub fn prepare_record(record: &Record, columns: &[CanonicalColumn], id_column: &str) -> Record {
    let mut prepared = Record::with_capacity(columns.len() + 1);
    prepared.insert(
        id_column.to_string(),
        Value::String(Uuid::new_v4().to_string()),
    );
    for col in columns {
        let cell = record.get(&col.name).unwrap_or(&Value::Null);
        prepared.insert(col.name.clone(), coerce_value(cell, col.data_type));
    }
    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamap_common::db::DataType;
    use serde_json::json;

    fn columns() -> Vec<CanonicalColumn> {
        vec![
            CanonicalColumn { name: "patient_id".to_string(), data_type: DataType::NVarchar },
            CanonicalColumn { name: "visit_count".to_string(), data_type: DataType::Int },
            CanonicalColumn { name: "visit_date".to_string(), data_type: DataType::DateTime },
        ]
    }

    #[test]
    fn prepare_stamps_row_id_and_coerces_cells() {
        let mut record = Record::new();
        record.insert("patient_id".to_string(), json!(10234));
        record.insert("visit_count".to_string(), json!("3"));
        record.insert("visit_date".to_string(), json!("25/12/2023"));
        record.insert("ignored_extra".to_string(), json!("x"));

        let prepared = prepare_record(&record, &columns(), "lab_id");

        let id = prepared.get("lab_id").and_then(Value::as_str).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(prepared.get("patient_id"), Some(&json!("10234")));
        assert_eq!(prepared.get("visit_count"), Some(&json!(3)));
        assert_eq!(prepared.get("visit_date"), Some(&json!("2023-12-25")));
        assert!(!prepared.contains_key("ignored_extra"));
    }

    #[test]
    fn prepare_fills_missing_columns_with_null() {
        let record = Record::new();
        let prepared = prepare_record(&record, &columns(), "lab_id");

        assert_eq!(prepared.get("patient_id"), Some(&Value::Null));
        assert_eq!(prepared.get("visit_count"), Some(&Value::Null));
        assert_eq!(prepared.len(), 4);
    }

    #[test]
    fn each_prepared_row_gets_a_distinct_id() {
        let record = Record::new();
        let a = prepare_record(&record, &columns(), "lab_id");
        let b = prepare_record(&record, &columns(), "lab_id");
        assert_ne!(a.get("lab_id"), b.get("lab_id"));
    }
}
