//! Extraction-SQL generation from mapped variables
//!
//! A mapping set for one (base repository, source system) pair designates a
//! primary table via the `PrimaryTableId` sentinel and a facility filter
//! column via `FacilityID`; every other mapping contributes one projected
//! column, and each distinct non-primary table contributes one LEFT JOIN
//! against the primary anchor.

use datamap_common::db::models::{
    DictionaryTerm, MappedVariable, Record, FACILITY_SENTINEL, PRIMARY_TABLE_SENTINEL,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryBuildError {
    #[error("No mappings exist for '{0}'")]
    NoMappings(String),

    #[error("No '{PRIMARY_TABLE_SENTINEL}' mapping exists for '{0}'; cannot anchor the FROM clause")]
    MissingPrimaryTable(String),

    #[error("No '{FACILITY_SENTINEL}' mapping exists for '{0}'; cannot scope extraction to the facility")]
    MissingFacilityColumn(String),
}

/// Generate the extraction SELECT for a live source connection
pub fn generate_query(
    baselookup: &str,
    mappings: &[MappedVariable],
    site_code: &str,
) -> Result<String, QueryBuildError> {
    if mappings.is_empty() {
        return Err(QueryBuildError::NoMappings(baselookup.to_string()));
    }

    let primary = mappings
        .iter()
        .find(|m| m.base_variable_mapped_to == PRIMARY_TABLE_SENTINEL)
        .ok_or_else(|| QueryBuildError::MissingPrimaryTable(baselookup.to_string()))?;
    let facility = mappings
        .iter()
        .find(|m| m.base_variable_mapped_to == FACILITY_SENTINEL)
        .ok_or_else(|| QueryBuildError::MissingFacilityColumn(baselookup.to_string()))?;

    let mut select_parts = Vec::new();
    let mut join_clauses: Vec<String> = Vec::new();

    for mapping in mappings {
        if mapping.base_variable_mapped_to == PRIMARY_TABLE_SENTINEL
            || mapping.base_variable_mapped_to == FACILITY_SENTINEL
        {
            continue;
        }

        select_parts.push(format!(
            "{}.{} AS \"{}\"",
            mapping.tablename, mapping.columnname, mapping.base_variable_mapped_to
        ));

        // One join per distinct non-primary table, not per mapping
        if mapping.tablename != primary.tablename
            && !join_clauses.iter().any(|j| j.contains(&mapping.tablename))
        {
            join_clauses.push(format!(
                "LEFT JOIN {} ON {}.{} = {}.{}",
                mapping.tablename,
                primary.tablename,
                primary.columnname,
                mapping.tablename,
                mapping.join_by
            ));
        }
    }

    let mut query = format!(
        "SELECT {} FROM {}",
        select_parts.join(", "),
        primary.tablename
    );
    for join in &join_clauses {
        query.push(' ');
        query.push_str(join);
    }
    query.push_str(&format!(
        " WHERE CAST({}.{} AS INT) = {}",
        facility.tablename, facility.columnname, site_code
    ));

    Ok(query)
}

/// Generate the flat projection for a csv/api staging-table source
///
/// Flat-file extracts are pre-scoped to the facility at import, so there is
/// no join or WHERE clause.
pub fn generate_flat_file_query(
    baselookup: &str,
    mappings: &[MappedVariable],
    staging_table: &str,
) -> Result<String, QueryBuildError> {
    let select_parts: Vec<String> = mappings
        .iter()
        .filter(|m| {
            m.base_variable_mapped_to != PRIMARY_TABLE_SENTINEL
                && m.base_variable_mapped_to != FACILITY_SENTINEL
        })
        .map(|m| format!("{} AS \"{}\"", m.columnname, m.base_variable_mapped_to))
        .collect();

    if select_parts.is_empty() {
        return Err(QueryBuildError::NoMappings(baselookup.to_string()));
    }

    Ok(format!(
        "SELECT {} FROM {}",
        select_parts.join(", "),
        staging_table
    ))
}

/// Wrap a query for a connectivity/shape test without pulling the full set
pub fn test_query(query: &str) -> String {
    format!("SELECT * FROM ({}) AS extract_test LIMIT 10", query)
}

/// Check a mapping set and its extracted sample against required terms
///
/// Returns one issue string per required active term that has no usable
/// mapping, plus one per mapped variable whose sampled column values are
/// empty or placeholders. An empty result means the set is complete and the
/// sampled data satisfies every required term.
pub fn validate_mandatory_fields(
    terms: &[DictionaryTerm],
    mappings: &[MappedVariable],
    sample: &[Record],
) -> Vec<String> {
    let mut issues = Vec::new();

    for term in terms.iter().filter(|t| t.is_required && t.is_active) {
        let mapped = mappings
            .iter()
            .find(|m| m.base_variable_mapped_to.eq_ignore_ascii_case(&term.term));

        match mapped {
            None => issues.push(format!("Required term '{}' is not mapped", term.term)),
            Some(m) if is_placeholder(&m.columnname) => issues.push(format!(
                "Required term '{}' is mapped to placeholder column '{}'",
                term.term, m.columnname
            )),
            Some(m) => {
                let dirty = sample
                    .iter()
                    .filter(|r| is_missing_cell(r.get(&term.term.to_lowercase())))
                    .count();
                if dirty > 0 {
                    issues.push(format!(
                        "Required term '{}' is empty or placeholder in {} of {} sampled rows \
                         (mapped from {}.{})",
                        term.term,
                        dirty,
                        sample.len(),
                        m.tablename,
                        m.columnname
                    ));
                }
            }
        }
    }

    issues
}

fn is_placeholder(column: &str) -> bool {
    let c = column.trim();
    c.is_empty() || c.eq_ignore_ascii_case("n/a") || c.eq_ignore_ascii_case("null")
}

/// An extracted cell that cannot satisfy a required term: absent, null,
/// empty, or one of the literal placeholders "N/A" / "NULL"
fn is_missing_cell(cell: Option<&Value>) -> bool {
    match cell {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => is_placeholder(s),
        Some(_) => false,
    }
}

/// Check a custom query's result columns against the dictionary terms
///
/// The caller runs the custom query with a LIMIT probe and passes the
/// result column names. The column set must equal the active term set:
/// missing terms and unexpected columns are both reported.
pub fn validate_custom_columns(terms: &[DictionaryTerm], result_columns: &[String]) -> Vec<String> {
    let active: Vec<&DictionaryTerm> = terms
        .iter()
        .filter(|t| t.is_active && t.deleted_at.is_none())
        .collect();

    let mut issues: Vec<String> = active
        .iter()
        .filter(|t| {
            !result_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&t.term))
        })
        .map(|t| format!("Query result has no column for term '{}'", t.term))
        .collect();

    issues.extend(
        result_columns
            .iter()
            .filter(|c| !active.iter().any(|t| t.term.eq_ignore_ascii_case(c)))
            .map(|c| format!("Query result column '{}' matches no dictionary term", c)),
    );

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn mapping(table: &str, column: &str, term: &str, join_by: &str) -> MappedVariable {
        MappedVariable {
            id: Uuid::new_v4(),
            tablename: table.to_string(),
            columnname: column.to_string(),
            datatype: "NVARCHAR".to_string(),
            base_repository: "lab".to_string(),
            base_variable_mapped_to: term.to_string(),
            join_by: join_by.to_string(),
            source_system_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn term(name: &str, required: bool) -> DictionaryTerm {
        DictionaryTerm {
            id: Uuid::new_v4(),
            dictionary: "lab".to_string(),
            dictionary_id: Uuid::new_v4(),
            term: name.to_string(),
            data_type: "NVARCHAR".to_string(),
            is_required: required,
            term_description: None,
            expected_values: None,
            is_active: true,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn full_mapping_set() -> Vec<MappedVariable> {
        vec![
            mapping("orders", "order_id", PRIMARY_TABLE_SENTINEL, ""),
            mapping("orders", "location_id", FACILITY_SENTINEL, ""),
            mapping("orders", "order_date", "order_date", ""),
            mapping("patients", "patient_uuid", "patient_id", "order_id"),
            mapping("patients", "birthdate", "dob", "order_id"),
        ]
    }

    #[test]
    fn query_anchors_on_primary_and_scopes_to_facility() {
        let q = generate_query("lab", &full_mapping_set(), "14080").unwrap();

        assert!(q.starts_with("SELECT "));
        assert!(q.contains("orders.order_date AS \"order_date\""));
        assert!(q.contains("patients.patient_uuid AS \"patient_id\""));
        assert!(q.contains("FROM orders"));
        assert!(q.contains("WHERE CAST(orders.location_id AS INT) = 14080"));
        // Sentinels are not projected
        assert!(!q.contains("PrimaryTableId"));
        assert!(!q.contains("FacilityID"));
    }

    #[test]
    fn one_join_per_distinct_table() {
        let q = generate_query("lab", &full_mapping_set(), "14080").unwrap();
        assert_eq!(q.matches("LEFT JOIN patients").count(), 1);
        assert!(q.contains("LEFT JOIN patients ON orders.order_id = patients.order_id"));
    }

    #[test]
    fn missing_primary_table_is_an_error() {
        let mappings = vec![
            mapping("orders", "location_id", FACILITY_SENTINEL, ""),
            mapping("orders", "order_date", "order_date", ""),
        ];
        let err = generate_query("vitals", &mappings, "14080").unwrap_err();
        assert!(matches!(err, QueryBuildError::MissingPrimaryTable(_)));
        assert!(err.to_string().contains("vitals"));
    }

    #[test]
    fn empty_mapping_set_is_an_error() {
        let err = generate_query("vitals", &[], "14080").unwrap_err();
        assert!(matches!(err, QueryBuildError::NoMappings(_)));
    }

    #[test]
    fn flat_file_query_has_no_joins() {
        let q = generate_flat_file_query("lab", &full_mapping_set(), "kenyaemr_csv_extract")
            .unwrap();
        assert_eq!(
            q,
            "SELECT order_date AS \"order_date\", patient_uuid AS \"patient_id\", \
             birthdate AS \"dob\" FROM kenyaemr_csv_extract"
        );
    }

    #[test]
    fn mandatory_field_validation() {
        let terms = vec![term("patient_id", true), term("dob", true), term("notes", false)];
        let mut mappings = full_mapping_set();

        assert!(validate_mandatory_fields(&terms, &mappings, &[]).is_empty());

        mappings.retain(|m| m.base_variable_mapped_to != "dob");
        mappings.push(mapping("patients", "N/A", "dob", "order_id"));
        let issues = validate_mandatory_fields(&terms, &mappings, &[]);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("dob"));
    }

    fn sample_row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn mandatory_field_validation_scans_sampled_values() {
        let terms = vec![term("dob", true), term("patient_id", true)];
        let mappings = full_mapping_set();

        // A correctly mapped term still fails when the extracted data is
        // empty or a literal placeholder
        let sample = vec![
            sample_row(&[("dob", Value::from("N/A")), ("patient_id", Value::from("a1"))]),
            sample_row(&[("dob", Value::from("NULL")), ("patient_id", Value::from("a2"))]),
            sample_row(&[("dob", Value::from("")), ("patient_id", Value::from("a3"))]),
        ];
        let issues = validate_mandatory_fields(&terms, &mappings, &sample);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("dob"));
        assert!(issues[0].contains("3 of 3"));
        assert!(issues[0].contains("patients.birthdate"));

        // Null and absent cells count the same as placeholders
        let sample = vec![
            sample_row(&[("dob", Value::Null), ("patient_id", Value::from("a1"))]),
            sample_row(&[("patient_id", Value::from("a2"))]),
        ];
        let issues = validate_mandatory_fields(&terms, &mappings, &sample);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("2 of 2"));

        // Clean data yields no issues
        let sample = vec![sample_row(&[
            ("dob", Value::from("1990-01-01")),
            ("patient_id", Value::from("a1")),
        ])];
        assert!(validate_mandatory_fields(&terms, &mappings, &sample).is_empty());
    }

    #[test]
    fn custom_column_validation_reports_both_directions() {
        let terms = vec![term("patient_id", true), term("dob", false)];

        let columns = vec!["Patient_ID".to_string()];
        let issues = validate_custom_columns(&terms, &columns);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("dob"));

        let columns = vec!["patient_id".to_string(), "dob".to_string(), "extra".to_string()];
        let issues = validate_custom_columns(&terms, &columns);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("extra"));

        let columns = vec!["patient_id".to_string(), "dob".to_string()];
        assert!(validate_custom_columns(&terms, &columns).is_empty());
    }
}
