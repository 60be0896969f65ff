//! Row models for the metadata store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One extracted/canonical row as a column-name → JSON value map
///
/// Column order is carried separately where inserts need it.
pub type Record = HashMap<String, serde_json::Value>;

/// Sentinel mapping designating the primary/anchor table and column for
/// generated extraction queries
pub const PRIMARY_TABLE_SENTINEL: &str = "PrimaryTableId";

/// Sentinel mapping designating the column used to filter source rows to
/// the current facility
pub const FACILITY_SENTINEL: &str = "FacilityID";

/// A dictionary (schema contract) at either the USL or the local layer
///
/// `name` is lowercased and is the canonical join key to terms; the UUID id
/// is carried for term stamping and change-log rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dictionary {
    pub id: Uuid,
    pub name: String,
    pub version_number: i32,
    pub is_published: bool,
    /// Active connection that owns the local copy; always None at the USL layer
    pub datasource_id: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One expected column within a dictionary
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DictionaryTerm {
    pub id: Uuid,
    /// Dictionary name, denormalized for query convenience
    pub dictionary: String,
    pub dictionary_id: Uuid,
    pub term: String,
    pub data_type: String,
    pub is_required: bool,
    pub term_description: Option<String>,
    /// Regex contract used for DQA validation
    pub expected_values: Option<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Change-log operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    Add,
    Edit,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Add => "ADD",
            ChangeOperation::Edit => "EDIT",
            ChangeOperation::Delete => "DELETE",
        }
    }
}

/// Append-only record of one term mutation, tagged with the dictionary
/// version the change produced
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DictionaryChangeLog {
    pub id: Uuid,
    pub dictionary_id: Uuid,
    pub term_id: Option<Uuid>,
    pub operation: String,
    /// JSON-serialized term snapshot before the change
    pub old_value: Option<serde_json::Value>,
    /// JSON-serialized term snapshot after the change
    pub new_value: Option<serde_json::Value>,
    pub version_number: i32,
    pub changed_at: DateTime<Utc>,
}

/// A source-system connection ("access credentials")
///
/// At most one row is active at any time; activation is atomic via the
/// active-config store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessCredentials {
    pub id: Uuid,
    pub conn_string: String,
    pub name: String,
    /// mysql / postgres / mssql / csv / api
    pub conn_type: String,
    pub system: Option<String>,
    pub system_version: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessCredentials {
    /// csv/api sources read a pre-imported staging table instead of a live
    /// connection
    pub fn is_flat_file(&self) -> bool {
        matches!(self.conn_type.as_str(), "csv" | "api")
    }

    /// Staging table name for flat-file extracts
    pub fn staging_table(&self) -> String {
        format!("{}_{}_extract", self.name.to_lowercase(), self.conn_type)
    }
}

/// Facility identity; same single-active invariant as AccessCredentials
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SiteConfig {
    pub id: Uuid,
    pub site_name: String,
    pub site_code: String,
    pub primary_system: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One column-to-term mapping for a (base repository, source system) pair
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MappedVariable {
    pub id: Uuid,
    pub tablename: String,
    pub columnname: String,
    pub datatype: String,
    pub base_repository: String,
    pub base_variable_mapped_to: String,
    /// Source-side join column against the primary table
    pub join_by: String,
    pub source_system_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Cached extraction SQL per (base repository, source system)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExtractQuery {
    pub id: Uuid,
    pub query: String,
    pub base_repository: String,
    pub source_system_id: Uuid,
    /// True when the user supplied a raw query; mapping edits must not
    /// regenerate over it
    pub is_custom: bool,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle actions recorded in transmission history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionAction {
    Loading,
    Loaded,
    Sending,
    Sent,
}

impl TransmissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionAction::Loading => "Loading",
            TransmissionAction::Loaded => "Loaded",
            TransmissionAction::Sending => "Sending",
            TransmissionAction::Sent => "Sent",
        }
    }
}

/// Append-only log of load and send runs
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransmissionHistory {
    pub id: Uuid,
    pub usl_repository_name: String,
    pub action: String,
    pub facility: String,
    pub source_system_id: Uuid,
    pub source_system_name: String,
    pub manifest_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Aggregate result of one DQA run; history accumulates per table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DqaReport {
    pub id: Uuid,
    pub base_table_name: String,
    pub valid_rows: i64,
    pub invalid_rows: i64,
    pub null_rows: i64,
    pub total_rows: i64,
    pub dictionary_version: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(name: &str, conn_type: &str) -> AccessCredentials {
        AccessCredentials {
            id: Uuid::new_v4(),
            conn_string: "-".to_string(),
            name: name.to_string(),
            conn_type: conn_type.to_string(),
            system: None,
            system_version: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn flat_file_detection() {
        assert!(credentials("kenyaemr", "csv").is_flat_file());
        assert!(credentials("kenyaemr", "api").is_flat_file());
        assert!(!credentials("kenyaemr", "mysql").is_flat_file());
    }

    #[test]
    fn staging_table_is_lowercased() {
        let c = credentials("KenyaEMR", "csv");
        assert_eq!(c.staging_table(), "kenyaemr_csv_extract");
    }
}
