//! Transmission engine
//!
//! Sends a canonical table downstream: a manifest describes the batch set,
//! then every page is POSTed to the staging aggregator in order. A mid-run
//! POST failure aborts the manifest; there is no batch-level retry, and the
//! open history row keeps its null `ended_at` as the failure marker.

use chrono::{DateTime, Utc};
use datamap_common::db::models::{Record, TransmissionAction};
use datamap_common::db::schema_sync::CanonicalTableSpec;
use datamap_common::events::DataMapEvent;
use datamap_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::{self, DictionaryLayer};
use crate::AppState;

/// Wire-protocol version sent with every manifest
pub const PROTOCOL_VERSION: &str = "1.0.0";

const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// One-shot descriptor the client acknowledges before batch sending starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest_id: Uuid,
    pub repository: String,
    pub total_rows: i64,
    pub batch_size: usize,
    pub total_batches: usize,
    pub columns: Vec<String>,
    pub facility: String,
    pub facility_id: String,
    pub source_system: String,
    pub source_system_version: Option<String>,
    pub dictionary_version: i32,
    pub protocol_version: String,
    pub generated_at: DateTime<Utc>,
}

/// One page as POSTed to the staging aggregator
#[derive(Debug, Serialize)]
struct BatchPayload<'a> {
    manifest_id: Uuid,
    batch_no: usize,
    total_batches: usize,
    facility: &'a str,
    facility_id: &'a str,
    data: &'a [Record],
}

/// Number of pages needed to send `total_rows` rows
pub fn total_batches(total_rows: i64, batch_size: usize) -> usize {
    if total_rows <= 0 {
        return 0;
    }
    (total_rows as usize).div_ceil(batch_size)
}

/// Progress after `processed` of `total` batches, as an integer percent
///
/// Rounds up so the sequence for three batches reads 34, 67, 100.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed * 100).div_ceil(total)).min(100) as u8
}

/// Build the manifest for one canonical table
pub async fn build_manifest(state: &AppState, baselookup: &str) -> Result<Manifest> {
    let pool = &state.db;

    let site = db::active::active_site(pool)
        .await?
        .ok_or_else(|| Error::InvalidInput("No active site configuration".to_string()))?;
    let source = db::active::active_source(pool)
        .await?
        .ok_or_else(|| Error::InvalidInput("No active source connection".to_string()))?;
    let dictionary = db::dictionaries::find_by_name(pool, DictionaryLayer::Local, baselookup)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dictionary '{}'", baselookup)))?;

    let columns =
        datamap_common::db::schema_sync::SchemaIntrospector::column_names(pool, baselookup)
            .await?;
    if columns.is_empty() {
        return Err(Error::NotFound(format!(
            "canonical table '{}' has not been loaded",
            baselookup
        )));
    }
    let total_rows = db::canonical::count_rows(pool, baselookup).await?;
    let batch_size = state.settings.batch_size;

    let manifest = Manifest {
        manifest_id: Uuid::new_v4(),
        repository: baselookup.to_string(),
        total_rows,
        batch_size,
        total_batches: total_batches(total_rows, batch_size),
        columns,
        facility: site.site_name,
        facility_id: site.site_code,
        source_system: source.name.clone(),
        source_system_version: source.system_version.clone(),
        dictionary_version: dictionary.version_number,
        protocol_version: PROTOCOL_VERSION.to_string(),
        generated_at: Utc::now(),
    };

    // The Sending history row opens with the manifest; the send run
    // back-fills ended_at and flips it to Sent. A manifest that is never
    // sent stays open as its own audit trail.
    db::history::open(
        pool,
        baselookup,
        TransmissionAction::Sending,
        &manifest.facility,
        source.id,
        &source.name,
        Some(manifest.manifest_id),
    )
    .await?;

    Ok(manifest)
}

/// Send every batch of a manifest in the background
///
/// The repository must already be claimed via [`AppState::claim_run`]; the
/// claim is released when the run completes or fails.
pub fn spawn_send(state: AppState, manifest: Manifest) {
    tokio::spawn(async move {
        let repository = manifest.repository.clone();
        let manifest_id = manifest.manifest_id;
        let total = manifest.total_batches;

        match execute_send(&state, &manifest).await {
            Ok(()) => {
                let _ = state.event_bus.emit(DataMapEvent::SendCompleted {
                    repository: repository.clone(),
                    manifest_id,
                    total_batches: total,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                error!(repository = %repository, error = %e, "Send run failed");
                let _ = state.event_bus.emit(DataMapEvent::SendFailed {
                    repository: repository.clone(),
                    manifest_id,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        state.release_run(&repository).await;
    });
}

async fn execute_send(state: &AppState, manifest: &Manifest) -> Result<()> {
    let pool = &state.db;
    let baselookup = &manifest.repository;

    let terms = db::terms::list_for_dictionary(pool, DictionaryLayer::Local, baselookup).await?;
    let spec = CanonicalTableSpec::from_terms(baselookup, &terms)?;

    let client = reqwest::Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()
        .map_err(|e| Error::Internal(e.to_string()))?;
    let url = format!("{}{}", state.settings.staging_api, baselookup);

    for batch_no in 1..=manifest.total_batches {
        let offset = ((batch_no - 1) * manifest.batch_size) as i64;
        let page =
            db::canonical::fetch_page(pool, &spec, manifest.batch_size as i64, offset).await?;

        let payload = BatchPayload {
            manifest_id: manifest.manifest_id,
            batch_no,
            total_batches: manifest.total_batches,
            facility: &manifest.facility,
            facility_id: &manifest.facility_id,
            data: &page,
        };

        let response = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("staging POST failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "staging aggregator returned status {} for batch {}",
                response.status(),
                batch_no
            )));
        }

        let _ = state.event_bus.emit(DataMapEvent::SendProgress {
            repository: baselookup.clone(),
            manifest_id: manifest.manifest_id,
            batch_no,
            total_batches: manifest.total_batches,
            progress_percent: progress_percent(batch_no, manifest.total_batches),
            timestamp: Utc::now(),
        });
    }

    db::history::close_by_manifest(pool, manifest.manifest_id, TransmissionAction::Sent).await?;
    info!(
        repository = %baselookup,
        manifest_id = %manifest.manifest_id,
        batches = manifest.total_batches,
        "Transmission complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batching_250_rows_at_100_gives_three_batches() {
        assert_eq!(total_batches(250, 100), 3);
        assert_eq!(progress_percent(1, 3), 34);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn exact_multiples_and_edges() {
        assert_eq!(total_batches(200, 100), 2);
        assert_eq!(total_batches(1, 100), 1);
        assert_eq!(total_batches(0, 100), 0);
        assert_eq!(progress_percent(0, 0), 100);
        assert_eq!(progress_percent(1, 1), 100);
    }

    #[test]
    fn percent_never_exceeds_100() {
        for total in 1..=10usize {
            for processed in 0..=total {
                assert!(progress_percent(processed, total) <= 100);
            }
        }
    }
}
