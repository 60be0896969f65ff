//! DQA engine: full-table validation against dictionary term contracts
//!
//! Every canonical row is checked cell-by-cell against its term's
//! `expected_values` regex and required-ness. Verdicts are stamped back
//! onto the rows and aggregated into one report per run.
//!
//! Pattern policy: a term whose `expected_values` does not compile as a
//! regex fails every row for that term. The broken contract surfaces in
//! the report instead of silently passing data through; one warning is
//! logged per run.

use datamap_common::db::models::{DictionaryTerm, DqaReport, Record};
use datamap_common::db::schema_sync::CanonicalTableSpec;
use datamap_common::{Error, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, dqa_reports::DqaCounts, DictionaryLayer};

/// Page size for the full-table validation scan
const SCAN_PAGE_SIZE: i64 = 500;

/// Compiled contract for one term
pub struct TermCheck {
    pub term: String,
    pub is_required: bool,
    pattern: Option<PatternState>,
}

enum PatternState {
    Compiled(Regex),
    /// The declared pattern did not compile; every row fails this term
    Broken,
}

/// Verdict for one canonical row
#[derive(Debug, Default, Serialize)]
pub struct RowVerdict {
    pub reasons: Vec<String>,
    /// At least one non-null cell failed its pattern check
    pub pattern_fail: bool,
    pub required_fail: bool,
}

impl RowVerdict {
    pub fn is_valid(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Per-row failure detail returned by a run
#[derive(Debug, Serialize)]
pub struct RowFailure {
    pub row_id: Uuid,
    pub reasons: Vec<String>,
    pub required_fail: bool,
}

/// Result of one DQA run
#[derive(Debug, Serialize)]
pub struct DqaRunResult {
    pub report: DqaReport,
    pub failures: Vec<RowFailure>,
}

/// Compile term contracts once per run
pub fn compile_checks(terms: &[DictionaryTerm]) -> Vec<TermCheck> {
    terms
        .iter()
        .filter(|t| t.is_active && t.deleted_at.is_none())
        .map(|t| {
            // Patterns are case-insensitive and anchored at the start of
            // the cell text
            let pattern = t.expected_values.as_deref().map(|p| {
                match Regex::new(&format!("(?i)^(?:{})", p)) {
                    Ok(re) => PatternState::Compiled(re),
                    Err(e) => {
                        warn!(
                            term = %t.term,
                            pattern = %p,
                            error = %e,
                            "expected_values pattern does not compile; every row will fail this term"
                        );
                        PatternState::Broken
                    }
                }
            });
            TermCheck {
                term: t.term.to_lowercase(),
                is_required: t.is_required,
                pattern,
            }
        })
        .collect()
}

/// Validate one record against the compiled checks
pub fn validate_row(checks: &[TermCheck], record: &Record) -> RowVerdict {
    let mut verdict = RowVerdict::default();

    for check in checks {
        let cell = record.get(&check.term).unwrap_or(&Value::Null);

        if cell.is_null() {
            if check.is_required {
                verdict.required_fail = true;
                verdict
                    .reasons
                    .push(format!("'{}' is null but required", check.term));
            }
            // Null cells never run the pattern check
            continue;
        }

        match &check.pattern {
            None => {}
            Some(PatternState::Compiled(re)) => {
                let text = cell_text(cell);
                if !re.is_match(&text) {
                    verdict.pattern_fail = true;
                    verdict.reasons.push(format!(
                        "'{}' value '{}' does not match the expected pattern",
                        check.term, text
                    ));
                }
            }
            Some(PatternState::Broken) => {
                verdict.pattern_fail = true;
                verdict.reasons.push(format!(
                    "'{}' has an invalid expected_values pattern",
                    check.term
                ));
            }
        }
    }

    verdict
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run a full DQA pass over one canonical table
pub async fn dqa_check(pool: &PgPool, baselookup: &str) -> Result<DqaRunResult> {
    let dictionary = db::dictionaries::find_by_name(pool, DictionaryLayer::Local, baselookup)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dictionary '{}'", baselookup)))?;
    let terms =
        db::terms::list_for_dictionary(pool, DictionaryLayer::Local, baselookup).await?;
    let spec = CanonicalTableSpec::from_terms(baselookup, &terms)?;
    let checks = compile_checks(&terms);
    let id_column = spec.id_column();

    let mut failures = Vec::new();
    let mut invalid_rows = 0i64;
    let mut null_rows = 0i64;
    let mut total_rows = 0i64;
    let mut offset = 0i64;

    loop {
        let page = db::canonical::fetch_page(pool, &spec, SCAN_PAGE_SIZE, offset).await?;
        if page.is_empty() {
            break;
        }
        offset += page.len() as i64;

        for record in &page {
            total_rows += 1;
            let verdict = validate_row(&checks, record);

            let row_id = record
                .get(&id_column)
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| Error::Internal(format!("row missing {}", id_column)))?;

            if verdict.pattern_fail {
                invalid_rows += 1;
            }
            if verdict.required_fail {
                null_rows += 1;
            }

            let reasons_json = if verdict.is_valid() {
                None
            } else {
                Some(serde_json::to_string(&verdict.reasons)?)
            };
            db::canonical::mark_dqa_verdict(
                pool,
                &spec,
                row_id,
                verdict.is_valid(),
                reasons_json.as_deref(),
                verdict.required_fail,
            )
            .await?;

            if !verdict.is_valid() {
                failures.push(RowFailure {
                    row_id,
                    reasons: verdict.reasons,
                    required_fail: verdict.required_fail,
                });
            }
        }
    }

    let counts = DqaCounts {
        valid_rows: total_rows - invalid_rows,
        invalid_rows,
        null_rows,
        total_rows,
    };
    let report =
        db::dqa_reports::insert(pool, baselookup, counts, dictionary.version_number).await?;

    info!(
        table = %baselookup,
        total = total_rows,
        invalid = invalid_rows,
        null = null_rows,
        "DQA run complete"
    );

    Ok(DqaRunResult { report, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn term(name: &str, required: bool, pattern: Option<&str>) -> DictionaryTerm {
        DictionaryTerm {
            id: Uuid::new_v4(),
            dictionary: "lab".to_string(),
            dictionary_id: Uuid::new_v4(),
            term: name.to_string(),
            data_type: "NVARCHAR".to_string(),
            is_required: required,
            term_description: None,
            expected_values: pattern.map(str::to_string),
            is_active: true,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn record(entries: &[(&str, Value)]) -> Record {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn clean_row_passes() {
        let checks = compile_checks(&[
            term("patient_id", true, Some(r"^\d+$")),
            term("notes", false, None),
        ]);
        let verdict = validate_row(
            &checks,
            &record(&[("patient_id", json!("12345")), ("notes", Value::Null)]),
        );
        assert!(verdict.is_valid());
        assert!(!verdict.required_fail);
    }

    #[test]
    fn pattern_mismatch_is_reported() {
        let checks = compile_checks(&[term("result", false, Some(r"^(POS|NEG)$"))]);
        let verdict = validate_row(&checks, &record(&[("result", json!("MAYBE"))]));
        assert!(!verdict.is_valid());
        assert!(verdict.reasons[0].contains("result"));
        assert!(!verdict.required_fail);
    }

    #[test]
    fn required_null_sets_the_null_flag_only() {
        let checks = compile_checks(&[term("patient_id", true, Some(r"^\d+$"))]);
        let verdict = validate_row(&checks, &record(&[("patient_id", Value::Null)]));
        assert!(verdict.required_fail);
        assert_eq!(verdict.reasons.len(), 1);
    }

    #[test]
    fn optional_null_skips_the_pattern_check() {
        let checks = compile_checks(&[term("result", false, Some(r"^(POS|NEG)$"))]);
        let verdict = validate_row(&checks, &record(&[("result", Value::Null)]));
        assert!(verdict.is_valid());
    }

    #[test]
    fn broken_pattern_fails_every_row() {
        let checks = compile_checks(&[term("result", false, Some(r"([unclosed"))]);
        let verdict = validate_row(&checks, &record(&[("result", json!("POS"))]));
        assert!(!verdict.is_valid());
        assert!(verdict.reasons[0].contains("invalid expected_values"));
    }

    #[test]
    fn numeric_cells_validate_as_text() {
        let checks = compile_checks(&[term("visit_count", false, Some(r"^\d+$"))]);
        let verdict = validate_row(&checks, &record(&[("visit_count", json!(7))]));
        assert!(verdict.is_valid());
    }

    #[test]
    fn patterns_are_case_insensitive_and_anchored() {
        let checks = compile_checks(&[term("result", false, Some(r"(POS|NEG)"))]);
        assert!(validate_row(&checks, &record(&[("result", json!("neg"))])).is_valid());
        // Anchored at the start: a prefix mismatch fails
        assert!(!validate_row(&checks, &record(&[("result", json!("UNKNOWN-POS"))])).is_valid());
        // Unanchored at the end, matching the original engine
        assert!(validate_row(&checks, &record(&[("result", json!("POSITIVE"))])).is_valid());
    }

    #[test]
    fn checks_use_lowercased_term_names() {
        let checks = compile_checks(&[term("Patient_ID", true, None)]);
        let verdict = validate_row(&checks, &record(&[("patient_id", json!("x"))]));
        assert!(verdict.is_valid());
    }
}
