//! Canonical-table schema provisioning
//!
//! Canonical tables are not migration-file-based: their columns are derived
//! at runtime from dictionary terms. This module reconciles the physical
//! DDL against that description — create-if-absent, add missing columns,
//! drop-and-recreate when a column's type drifted. Canonical data is fully
//! reloaded on every extraction run, so recreation loses nothing durable.
//!
//! Three-phase reconciliation per table:
//! 1. Introspect actual columns via information_schema
//! 2. Diff against the expected spec
//! 3. Apply: CREATE TABLE / ALTER TABLE ADD COLUMN / recreate

use crate::db::data_types::DataType;
use crate::db::models::DictionaryTerm;
use crate::{Error, Result};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

/// DQA marker columns appended to every canonical table
pub const DQA_MARKER_COLUMNS: &[(&str, &str)] = &[
    ("data_valid", "BOOLEAN"),
    ("invalid_data_reasons", "TEXT"),
    ("data_required_check_fail", "BOOLEAN"),
];

/// Validate a dynamic identifier (table or column name)
///
/// Dictionary names and terms flow into DDL and query text; anything
/// outside `[a-z_][a-z0-9_]*` is rejected before it reaches SQL.
pub fn ensure_safe_ident(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);
    if valid_first && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "'{}' is not a valid table or column identifier",
            name
        )))
    }
}

/// Shadow table a load run fills before the atomic swap
pub fn shadow_table_name(base: &str) -> String {
    format!("{}__load", base)
}

/// One expected canonical column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalColumn {
    pub name: String,
    pub data_type: DataType,
}

/// Expected schema of one canonical table, derived from dictionary terms
#[derive(Debug, Clone)]
pub struct CanonicalTableSpec {
    pub table_name: String,
    pub columns: Vec<CanonicalColumn>,
}

impl CanonicalTableSpec {
    /// Build the expected schema from a dictionary's active terms
    ///
    /// Terms are lowercased; the `{table}_id` primary key and DQA marker
    /// columns are added by the DDL builder, not listed here.
    pub fn from_terms(dictionary_name: &str, terms: &[DictionaryTerm]) -> Result<Self> {
        let table_name = dictionary_name.to_lowercase();
        ensure_safe_ident(&table_name)?;

        let mut columns = Vec::with_capacity(terms.len());
        for term in terms.iter().filter(|t| t.is_active && t.deleted_at.is_none()) {
            let name = term.term.to_lowercase();
            ensure_safe_ident(&name)?;
            columns.push(CanonicalColumn {
                name,
                data_type: DataType::parse_or_text(&term.data_type),
            });
        }

        Ok(Self { table_name, columns })
    }

    /// Primary-key column name, `{table}_id`
    pub fn id_column(&self) -> String {
        format!("{}_id", self.table_name)
    }

    /// CREATE TABLE statement for this spec (used for both the canonical
    /// table and its load shadow)
    pub fn create_table_sql(&self, physical_name: &str) -> String {
        let mut parts = vec![format!("{} UUID PRIMARY KEY", self.id_column())];
        for col in &self.columns {
            parts.push(format!("{} {}", col.name, col.data_type.postgres_type()));
        }
        for (name, sql_type) in DQA_MARKER_COLUMNS {
            parts.push(format!("{} {}", name, sql_type));
        }
        format!("CREATE TABLE {} ({})", physical_name, parts.join(", "))
    }
}

/// Actual column from information_schema introspection
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub name: String,
    pub data_type: String,
}

/// Schema drift detected between expected and actual schema
#[derive(Debug, Clone)]
pub enum SchemaDrift {
    /// Column missing from the physical table (fixable via ALTER TABLE)
    MissingColumn { column: CanonicalColumn },
    /// Column type drifted (fixed by drop-and-recreate)
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: String,
    },
}

/// Schema introspection over information_schema
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Check whether a table exists in the current schema
    pub async fn table_exists(pool: &PgPool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// Read actual columns of a table, in ordinal order
    pub async fn introspect_table(pool: &PgPool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ActualColumn {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
            })
            .collect())
    }

    /// Column names only, for manifest generation and custom-query checks
    pub async fn column_names(pool: &PgPool, table_name: &str) -> Result<Vec<String>> {
        Ok(Self::introspect_table(pool, table_name)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }
}

/// Schema comparison - detect drift between expected and actual
pub struct SchemaDiff;

impl SchemaDiff {
    /// Compare the expected term columns to the actual table columns
    ///
    /// The id column and DQA markers are never reported as drift; extra
    /// physical columns are ignored (dropped terms disappear at the next
    /// recreate).
    pub fn compare(expected: &[CanonicalColumn], actual: &[ActualColumn]) -> Vec<SchemaDrift> {
        let mut drift = Vec::new();

        for col in expected {
            match actual.iter().find(|a| a.name == col.name) {
                Some(actual_col) => {
                    if !Self::types_compatible(col.data_type, &actual_col.data_type) {
                        drift.push(SchemaDrift::TypeMismatch {
                            column: col.name.clone(),
                            expected: col.data_type.postgres_type(),
                            actual: actual_col.data_type.clone(),
                        });
                    }
                }
                None => drift.push(SchemaDrift::MissingColumn { column: col.clone() }),
            }
        }

        drift
    }

    /// Match a term data type against an information_schema data_type string
    fn types_compatible(expected: DataType, actual: &str) -> bool {
        let actual = actual.to_lowercase();
        match expected {
            DataType::Int => actual.contains("int"),
            DataType::NVarchar | DataType::Varchar | DataType::Text => {
                actual == "text" || actual.contains("char")
            }
            DataType::Boolean => actual == "boolean",
            DataType::Float => actual == "real",
            DataType::Double => actual == "double precision",
            DataType::DateTime | DataType::DateTime2 => actual == "date",
            DataType::Uuid => actual == "uuid",
        }
    }
}

/// Schema synchronization - apply schema changes to the store
pub struct SchemaSync;

impl SchemaSync {
    /// Reconcile one canonical table against its expected spec
    ///
    /// Missing table → CREATE; missing columns → ALTER TABLE ADD COLUMN;
    /// any type mismatch → drop and recreate (canonical contents are
    /// replaced wholesale on every load run).
    pub async fn sync_table(pool: &PgPool, spec: &CanonicalTableSpec) -> Result<()> {
        let table = &spec.table_name;

        if !SchemaIntrospector::table_exists(pool, table).await? {
            info!(table = %table, "Creating canonical table");
            sqlx::query(&spec.create_table_sql(table)).execute(pool).await?;
            return Ok(());
        }

        let actual = SchemaIntrospector::introspect_table(pool, table).await?;
        let drift = SchemaDiff::compare(&spec.columns, &actual);

        if drift.is_empty() {
            return Ok(());
        }

        if drift
            .iter()
            .any(|d| matches!(d, SchemaDrift::TypeMismatch { .. }))
        {
            for d in &drift {
                if let SchemaDrift::TypeMismatch { column, expected, actual } = d {
                    warn!(
                        table = %table,
                        column = %column,
                        expected = %expected,
                        actual = %actual,
                        "Canonical column type drifted; recreating table"
                    );
                }
            }
            sqlx::query(&format!("DROP TABLE {}", table)).execute(pool).await?;
            sqlx::query(&spec.create_table_sql(table)).execute(pool).await?;
            return Ok(());
        }

        for d in drift {
            if let SchemaDrift::MissingColumn { column } = d {
                info!(table = %table, column = %column.name, "Adding canonical column");
                sqlx::query(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table,
                    column.name,
                    column.data_type.postgres_type()
                ))
                .execute(pool)
                .await?;
            }
        }

        Ok(())
    }

    /// Create a fresh, empty shadow table for a load run
    pub async fn create_shadow_table(pool: &PgPool, spec: &CanonicalTableSpec) -> Result<String> {
        let shadow = shadow_table_name(&spec.table_name);
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", shadow))
            .execute(pool)
            .await?;
        sqlx::query(&spec.create_table_sql(&shadow)).execute(pool).await?;
        Ok(shadow)
    }

    /// Atomically swap a filled shadow table into place
    ///
    /// One transaction drops the previous canonical table and renames the
    /// shadow, so readers never observe a partially loaded table.
    pub async fn swap_shadow_table(pool: &PgPool, spec: &CanonicalTableSpec) -> Result<()> {
        let table = &spec.table_name;
        let shadow = shadow_table_name(table);

        let mut tx = pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", shadow, table))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(table = %table, "Canonical table swapped in");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn term(dictionary: &str, name: &str, data_type: &str, active: bool) -> DictionaryTerm {
        DictionaryTerm {
            id: Uuid::new_v4(),
            dictionary: dictionary.to_string(),
            dictionary_id: Uuid::new_v4(),
            term: name.to_string(),
            data_type: data_type.to_string(),
            is_required: false,
            term_description: None,
            expected_values: None,
            is_active: active,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ident_validation() {
        assert!(ensure_safe_ident("lab").is_ok());
        assert!(ensure_safe_ident("patient_id2").is_ok());
        assert!(ensure_safe_ident("_staging").is_ok());
        assert!(ensure_safe_ident("Lab").is_err());
        assert!(ensure_safe_ident("lab; DROP TABLE x").is_err());
        assert!(ensure_safe_ident("").is_err());
        assert!(ensure_safe_ident("1lab").is_err());
    }

    #[test]
    fn spec_from_terms_lowercases_and_skips_inactive() {
        let terms = vec![
            term("lab", "Patient_ID", "NVARCHAR", true),
            term("lab", "result_date", "DATETIME", true),
            term("lab", "obsolete", "INT", false),
        ];
        let spec = CanonicalTableSpec::from_terms("Lab", &terms).unwrap();

        assert_eq!(spec.table_name, "lab");
        assert_eq!(spec.id_column(), "lab_id");
        assert_eq!(spec.columns.len(), 2);
        assert_eq!(spec.columns[0].name, "patient_id");
        assert_eq!(spec.columns[1].data_type, DataType::DateTime);
    }

    #[test]
    fn create_table_sql_includes_pk_and_dqa_markers() {
        let terms = vec![term("lab", "patient_id", "NVARCHAR", true)];
        let spec = CanonicalTableSpec::from_terms("lab", &terms).unwrap();
        let sql = spec.create_table_sql("lab");

        assert!(sql.starts_with("CREATE TABLE lab ("));
        assert!(sql.contains("lab_id UUID PRIMARY KEY"));
        assert!(sql.contains("patient_id TEXT"));
        assert!(sql.contains("data_valid BOOLEAN"));
        assert!(sql.contains("invalid_data_reasons TEXT"));
        assert!(sql.contains("data_required_check_fail BOOLEAN"));
    }

    #[test]
    fn diff_reports_missing_and_mismatched_columns() {
        let expected = vec![
            CanonicalColumn { name: "patient_id".to_string(), data_type: DataType::NVarchar },
            CanonicalColumn { name: "visit_count".to_string(), data_type: DataType::Int },
            CanonicalColumn { name: "result_date".to_string(), data_type: DataType::DateTime },
        ];
        let actual = vec![
            ActualColumn { name: "patient_id".to_string(), data_type: "text".to_string() },
            ActualColumn { name: "result_date".to_string(), data_type: "text".to_string() },
        ];

        let drift = SchemaDiff::compare(&expected, &actual);
        assert_eq!(drift.len(), 2);
        assert!(matches!(
            &drift[0],
            SchemaDrift::MissingColumn { column } if column.name == "visit_count"
        ));
        assert!(matches!(
            &drift[1],
            SchemaDrift::TypeMismatch { column, .. } if column == "result_date"
        ));
    }

    #[test]
    fn diff_ignores_extra_physical_columns() {
        let expected = vec![CanonicalColumn {
            name: "patient_id".to_string(),
            data_type: DataType::Text,
        }];
        let actual = vec![
            ActualColumn { name: "lab_id".to_string(), data_type: "uuid".to_string() },
            ActualColumn { name: "patient_id".to_string(), data_type: "text".to_string() },
            ActualColumn { name: "data_valid".to_string(), data_type: "boolean".to_string() },
        ];

        assert!(SchemaDiff::compare(&expected, &actual).is_empty());
    }

    #[test]
    fn shadow_name() {
        assert_eq!(shadow_table_name("lab"), "lab__load");
    }
}
