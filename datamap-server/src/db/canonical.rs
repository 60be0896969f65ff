//! Canonical staging-table data access
//!
//! Canonical tables have no compile-time row type: their columns come from
//! dictionary terms. Reads and writes go through [`CanonicalTableSpec`] so
//! every cell is bound and decoded with the type its term declares.

use chrono::NaiveDate;
use datamap_common::db::models::Record;
use datamap_common::db::schema_sync::{CanonicalTableSpec, DQA_MARKER_COLUMNS};
use datamap_common::db::DataType;
use datamap_common::{Error, Result};
use serde_json::Value;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Insert one batch of coerced records into a physical table
///
/// Records must already be coerced: every cell either null or the JSON
/// shape its term's data type expects. The `{table}_id` key must be present
/// on every record.
pub async fn insert_batch(
    pool: &PgPool,
    spec: &CanonicalTableSpec,
    physical_table: &str,
    records: &[Record],
) -> Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let id_column = spec.id_column();
    let mut column_list = vec![id_column.clone()];
    column_list.extend(spec.columns.iter().map(|c| c.name.clone()));

    let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        physical_table,
        column_list.join(", ")
    ));

    // Row ids are parsed up front so a malformed record fails the batch
    // before any SQL is issued
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        let id = record
            .get(&id_column)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                Error::Internal(format!("record missing {} row id", id_column))
            })?;
        ids.push(id);
    }

    builder.push_values(records.iter().zip(ids), |mut b, (record, id)| {
        b.push_bind(id);
        for col in &spec.columns {
            let cell = record.get(&col.name).unwrap_or(&Value::Null);
            match col.data_type {
                DataType::Int => {
                    // Canonical INT columns are 32-bit
                    b.push_bind(cell.as_i64().and_then(|i| i32::try_from(i).ok()));
                }
                DataType::Boolean => {
                    b.push_bind(cell.as_bool());
                }
                DataType::Float => {
                    b.push_bind(cell.as_f64().map(|f| f as f32));
                }
                DataType::Double => {
                    b.push_bind(cell.as_f64());
                }
                DataType::DateTime | DataType::DateTime2 => {
                    let date = cell
                        .as_str()
                        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok());
                    b.push_bind(date);
                }
                DataType::Uuid => {
                    let value = cell.as_str().and_then(|s| Uuid::parse_str(s).ok());
                    b.push_bind(value);
                }
                DataType::NVarchar | DataType::Varchar | DataType::Text => {
                    let value = match cell {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    };
                    b.push_bind(value);
                }
            }
        }
    });

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Every column a page read carries: the row id, the term columns, and the
/// DQA marker columns, matching what the table physically holds
pub fn page_column_list(spec: &CanonicalTableSpec) -> Vec<String> {
    let mut columns = vec![spec.id_column()];
    columns.extend(spec.columns.iter().map(|c| c.name.clone()));
    columns.extend(DQA_MARKER_COLUMNS.iter().map(|(name, _)| name.to_string()));
    columns
}

/// Read one page of canonical rows as records, in id order
///
/// Cells decode to the JSON shape of their term type; dates come back as
/// `YYYY-MM-DD` strings, the row id as a string UUID. The DQA marker
/// columns ride along so transmitted rows keep their verdicts.
pub async fn fetch_page(
    pool: &PgPool,
    spec: &CanonicalTableSpec,
    limit: i64,
    offset: i64,
) -> Result<Vec<Record>> {
    let id_column = spec.id_column();

    let rows = sqlx::query(&format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
        page_column_list(spec).join(", "),
        spec.table_name,
        id_column,
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Record::new();
        let id: Uuid = row.try_get(id_column.as_str())?;
        record.insert(id_column.clone(), Value::String(id.to_string()));

        for col in &spec.columns {
            let name = col.name.as_str();
            let value = match col.data_type {
                DataType::Int => row
                    .try_get::<Option<i32>, _>(name)?
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                DataType::Boolean => row
                    .try_get::<Option<bool>, _>(name)?
                    .map(Value::Bool)
                    .unwrap_or(Value::Null),
                DataType::Float => row
                    .try_get::<Option<f32>, _>(name)?
                    .map(|f| Value::from(f as f64))
                    .unwrap_or(Value::Null),
                DataType::Double => row
                    .try_get::<Option<f64>, _>(name)?
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                DataType::DateTime | DataType::DateTime2 => row
                    .try_get::<Option<NaiveDate>, _>(name)?
                    .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
                    .unwrap_or(Value::Null),
                DataType::Uuid => row
                    .try_get::<Option<Uuid>, _>(name)?
                    .map(|u| Value::String(u.to_string()))
                    .unwrap_or(Value::Null),
                DataType::NVarchar | DataType::Varchar | DataType::Text => row
                    .try_get::<Option<String>, _>(name)?
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            };
            record.insert(col.name.clone(), value);
        }

        let (valid_col, _) = DQA_MARKER_COLUMNS[0];
        let (reasons_col, _) = DQA_MARKER_COLUMNS[1];
        let (required_col, _) = DQA_MARKER_COLUMNS[2];
        record.insert(
            valid_col.to_string(),
            row.try_get::<Option<bool>, _>(valid_col)?
                .map(Value::Bool)
                .unwrap_or(Value::Null),
        );
        record.insert(
            reasons_col.to_string(),
            row.try_get::<Option<String>, _>(reasons_col)?
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        record.insert(
            required_col.to_string(),
            row.try_get::<Option<bool>, _>(required_col)?
                .map(Value::Bool)
                .unwrap_or(Value::Null),
        );

        records.push(record);
    }

    Ok(records)
}

/// Stamp the DQA verdict columns on one canonical row
pub async fn mark_dqa_verdict(
    pool: &PgPool,
    spec: &CanonicalTableSpec,
    row_id: Uuid,
    data_valid: bool,
    invalid_data_reasons: Option<&str>,
    data_required_check_fail: bool,
) -> Result<()> {
    let (valid_col, _) = DQA_MARKER_COLUMNS[0];
    let (reasons_col, _) = DQA_MARKER_COLUMNS[1];
    let (required_col, _) = DQA_MARKER_COLUMNS[2];

    sqlx::query(&format!(
        "UPDATE {} SET {} = $2, {} = $3, {} = $4 WHERE {} = $1",
        spec.table_name,
        valid_col,
        reasons_col,
        required_col,
        spec.id_column(),
    ))
    .bind(row_id)
    .bind(data_valid)
    .bind(invalid_data_reasons)
    .bind(data_required_check_fail)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datamap_common::db::models::DictionaryTerm;

    fn term(name: &str, data_type: &str) -> DictionaryTerm {
        DictionaryTerm {
            id: Uuid::new_v4(),
            dictionary: "lab".to_string(),
            dictionary_id: Uuid::new_v4(),
            term: name.to_string(),
            data_type: data_type.to_string(),
            is_required: false,
            term_description: None,
            expected_values: None,
            is_active: true,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn page_reads_cover_every_physical_column() {
        let terms = vec![term("patient_id", "NVARCHAR"), term("dob", "DATETIME")];
        let spec = CanonicalTableSpec::from_terms("lab", &terms).unwrap();

        let columns = page_column_list(&spec);
        assert_eq!(columns[0], "lab_id");
        assert!(columns.contains(&"patient_id".to_string()));
        assert!(columns.contains(&"dob".to_string()));
        // Verdict markers ride along with transmitted rows
        assert!(columns.contains(&"data_valid".to_string()));
        assert!(columns.contains(&"invalid_data_reasons".to_string()));
        assert!(columns.contains(&"data_required_check_fail".to_string()));

        // Page reads and the physical table agree column for column
        let ddl = spec.create_table_sql(&spec.table_name);
        for column in &columns {
            assert!(ddl.contains(column.as_str()), "missing {}", column);
        }
    }
}
