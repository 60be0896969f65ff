//! Dictionary sync engine
//!
//! Mirrors the master dictionary set into the local active layer. The
//! master set comes from the Universal Dictionary service when one is
//! configured, otherwise from the local USL tables. Mirroring is
//! full-replace: term sets are replaced wholesale and local dictionaries
//! absent from the master set are removed.

use datamap_common::db::schema_sync::{CanonicalTableSpec, SchemaSync};
use datamap_common::Result;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db::{self, terms::TermInput, DictionaryLayer};
use crate::services::reconcile::reconcile;
use crate::services::universal_dictionary::{
    RemoteDictionaryEntry, UniversalDictionaryClient, UniversalDictionaryError,
};

/// Outcome of one sync run
#[derive(Debug, Default, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Drift-detector result for `dictionary_version_notification`
#[derive(Debug, Serialize)]
pub struct VersionNotification {
    pub to_update: bool,
    pub message: String,
}

/// A dictionary plus its terms in layer-neutral form
#[derive(Debug, Clone)]
pub struct MasterEntry {
    pub name: String,
    pub version_number: i32,
    pub is_published: bool,
    pub terms: Vec<TermInput>,
}

impl From<RemoteDictionaryEntry> for MasterEntry {
    fn from(entry: RemoteDictionaryEntry) -> Self {
        Self {
            name: entry.dictionary.name.to_lowercase(),
            version_number: entry.dictionary.version_number,
            is_published: entry.dictionary.is_published,
            terms: entry
                .dictionary_terms
                .into_iter()
                .map(|t| TermInput {
                    term: t.term,
                    data_type: t.data_type,
                    is_required: t.is_required,
                    term_description: t.term_description,
                    expected_values: t.expected_values,
                    is_active: t.is_active,
                })
                .collect(),
        }
    }
}

/// Read the master set: remote pull when configured, USL tables otherwise
pub async fn load_master_set(
    pool: &PgPool,
    client: Option<&UniversalDictionaryClient>,
) -> Result<Vec<MasterEntry>> {
    match client {
        Some(client) => {
            let entries = client.fetch_dictionaries().await.map_err(to_common)?;
            Ok(entries.into_iter().map(MasterEntry::from).collect())
        }
        None => load_usl_set(pool).await,
    }
}

async fn load_usl_set(pool: &PgPool) -> Result<Vec<MasterEntry>> {
    let dictionaries = db::dictionaries::list(pool, DictionaryLayer::Usl).await?;
    let mut entries = Vec::with_capacity(dictionaries.len());
    for dict in dictionaries {
        let terms = db::terms::list_for_dictionary(pool, DictionaryLayer::Usl, &dict.name).await?;
        entries.push(MasterEntry {
            name: dict.name,
            version_number: dict.version_number,
            is_published: dict.is_published,
            terms: terms
                .into_iter()
                .map(|t| TermInput {
                    term: t.term,
                    data_type: t.data_type,
                    is_required: t.is_required,
                    term_description: t.term_description,
                    expected_values: t.expected_values,
                    is_active: t.is_active,
                })
                .collect(),
        });
    }
    Ok(entries)
}

/// Mirror the master set into the local layer for one datasource, then
/// reconcile the canonical tables against the new term sets
pub async fn sync_all(
    pool: &PgPool,
    client: Option<&UniversalDictionaryClient>,
    datasource_id: Uuid,
) -> Result<SyncSummary> {
    let master = load_master_set(pool, client).await?;

    // When pulling from the remote service, refresh the USL layer first so
    // drift detection and later offline syncs see the same master set
    if client.is_some() {
        mirror_layer(pool, DictionaryLayer::Usl, None, &master).await?;
    }

    let summary = mirror_layer(pool, DictionaryLayer::Local, Some(datasource_id), &master).await?;

    // Canonical DDL reconciliation trails the sync in the background; the
    // sync response does not wait on table rebuilds
    let provision_pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = provision_canonical_tables(&provision_pool).await {
            tracing::warn!(error = %e, "Canonical table reconciliation after sync failed");
        }
    });

    info!(
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        "Dictionary sync complete"
    );
    Ok(summary)
}

/// Full-replace mirror of the master set into one layer
async fn mirror_layer(
    pool: &PgPool,
    layer: DictionaryLayer,
    datasource_id: Option<Uuid>,
    master: &[MasterEntry],
) -> Result<SyncSummary> {
    let existing = match (layer, datasource_id) {
        (DictionaryLayer::Local, Some(ds)) => db::dictionaries::list_for_datasource(pool, ds).await?,
        _ => db::dictionaries::list(pool, layer).await?,
    };

    let plan = reconcile(
        &existing,
        master,
        |d| d.name.clone(),
        |m| m.name.clone(),
    );

    let mut summary = SyncSummary::default();

    for entry in &plan.to_insert {
        let dict = db::dictionaries::insert(
            pool,
            layer,
            &entry.name,
            entry.version_number,
            entry.is_published,
            datasource_id,
        )
        .await?;
        replace_terms(pool, layer, &dict.name, dict.id, &entry.terms).await?;
        summary.created += 1;
    }

    for (local, entry) in &plan.to_update {
        db::dictionaries::update_version_published(
            pool,
            layer,
            local.id,
            entry.version_number,
            entry.is_published,
        )
        .await?;
        replace_terms(pool, layer, &local.name, local.id, &entry.terms).await?;
        summary.updated += 1;
    }

    for local in &plan.to_delete {
        db::dictionaries::delete_with_terms(pool, layer, local.id).await?;
        summary.deleted += 1;
    }

    Ok(summary)
}

async fn replace_terms(
    pool: &PgPool,
    layer: DictionaryLayer,
    dictionary: &str,
    dictionary_id: Uuid,
    terms: &[TermInput],
) -> Result<()> {
    db::terms::delete_for_dictionary(pool, layer, dictionary_id).await?;
    for term in terms {
        db::terms::insert(pool, layer, dictionary, dictionary_id, term).await?;
    }
    Ok(())
}

/// Side-effect-free drift detector between the master set and the local layer
pub async fn version_notification(
    pool: &PgPool,
    client: Option<&UniversalDictionaryClient>,
    datasource_id: Uuid,
) -> Result<VersionNotification> {
    let master = load_master_set(pool, client).await?;
    let local = db::dictionaries::list_for_datasource(pool, datasource_id).await?;

    let plan = reconcile(&local, &master, |d| d.name.clone(), |m| m.name.clone());

    let mut pending = 0usize;
    // Master dictionaries with no local counterpart count when published
    pending += plan.to_insert.iter().filter(|m| m.is_published).count();
    // Local dictionaries orphaned from the master set always count
    pending += plan.to_delete.len();
    for (local_dict, master_entry) in &plan.to_update {
        if local_dict.version_number != master_entry.version_number
            || local_dict.is_published != master_entry.is_published
        {
            pending += 1;
        }
    }

    Ok(VersionNotification {
        to_update: pending > 0,
        message: format!("{} pending updates", pending),
    })
}

/// Reconcile every canonical table against the local dictionary terms
///
/// Runs after each sync and at startup; create-if-absent, add missing
/// columns, recreate on type drift.
pub async fn provision_canonical_tables(pool: &PgPool) -> Result<()> {
    let dictionaries = db::dictionaries::list(pool, DictionaryLayer::Local).await?;
    for dict in dictionaries {
        let terms =
            db::terms::list_for_dictionary(pool, DictionaryLayer::Local, &dict.name).await?;
        let spec = CanonicalTableSpec::from_terms(&dict.name, &terms)?;
        if spec.columns.is_empty() {
            continue;
        }
        SchemaSync::sync_table(pool, &spec).await?;
    }
    Ok(())
}

fn to_common(err: UniversalDictionaryError) -> datamap_common::Error {
    datamap_common::Error::Internal(format!("Universal Dictionary pull failed: {}", err))
}
