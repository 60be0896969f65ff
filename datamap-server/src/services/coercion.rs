//! Per-cell value coercion for extraction/load
//!
//! Source rows arrive as loosely typed JSON values; every cell is coerced
//! to the shape its dictionary term declares before insert. Coercion is
//! idempotent: feeding an already-coerced value back through produces the
//! same value, so staged flat-file extracts and live rows take one path.
//!
//! Unparseable cells become null rather than failing the batch; DQA then
//! reports them against the term contract.

use chrono::NaiveDate;
use datamap_common::db::DataType;
use serde_json::Value;
use uuid::Uuid;

/// Date formats accepted from source systems, tried in order
///
/// The canonical output format `%Y-%m-%d` comes first so re-coercion is a
/// no-op.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

/// Coerce one cell to its term's data type
pub fn coerce_value(value: &Value, data_type: DataType) -> Value {
    // Null and blank strings normalize to null for every type
    if is_blank(value) {
        return Value::Null;
    }

    match data_type {
        DataType::Int => coerce_int(value),
        DataType::Boolean => coerce_bool(value),
        DataType::Float | DataType::Double => coerce_float(value),
        DataType::DateTime | DataType::DateTime2 => coerce_date(value),
        DataType::Uuid => coerce_uuid(value),
        DataType::NVarchar | DataType::Varchar | DataType::Text => coerce_text(value),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn coerce_int(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else {
                n.as_f64().map(|f| Value::from(f.trunc() as i64)).unwrap_or(Value::Null)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else if let Ok(f) = s.parse::<f64>() {
                Value::from(f.trunc() as i64)
            } else {
                Value::Null
            }
        }
        Value::Bool(b) => Value::from(*b as i64),
        _ => Value::Null,
    }
}

fn coerce_bool(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Value::Bool(false),
            Some(1) => Value::Bool(true),
            _ => Value::Null,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn coerce_float(value: &Value) -> Value {
    match value {
        Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_date(value: &Value) -> Value {
    let Value::String(s) = value else {
        return Value::Null;
    };
    // Datetime strings carry the date in front of a space or 'T' separator
    let date_part = s.trim().split(['T', ' ']).next().unwrap_or("");

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Value::String(date.format("%Y-%m-%d").to_string());
        }
    }
    Value::Null
}

fn coerce_uuid(value: &Value) -> Value {
    match value {
        Value::String(s) => Uuid::parse_str(s.trim())
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_text(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.clone()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_and_null_normalize_to_null() {
        for dt in [DataType::Int, DataType::Text, DataType::DateTime, DataType::Boolean] {
            assert_eq!(coerce_value(&Value::Null, dt), Value::Null);
            assert_eq!(coerce_value(&json!(""), dt), Value::Null);
            assert_eq!(coerce_value(&json!("   "), dt), Value::Null);
        }
    }

    #[test]
    fn int_coercion() {
        assert_eq!(coerce_value(&json!("42"), DataType::Int), json!(42));
        assert_eq!(coerce_value(&json!(42), DataType::Int), json!(42));
        assert_eq!(coerce_value(&json!("3.9"), DataType::Int), json!(3));
        assert_eq!(coerce_value(&json!("abc"), DataType::Int), Value::Null);
    }

    #[test]
    fn bool_coercion() {
        assert_eq!(coerce_value(&json!("true"), DataType::Boolean), json!(true));
        assert_eq!(coerce_value(&json!("0"), DataType::Boolean), json!(false));
        assert_eq!(coerce_value(&json!(1), DataType::Boolean), json!(true));
        assert_eq!(coerce_value(&json!("maybe"), DataType::Boolean), Value::Null);
    }

    #[test]
    fn date_coercion_accepts_source_formats() {
        assert_eq!(
            coerce_value(&json!("25-12-2023"), DataType::DateTime),
            json!("2023-12-25")
        );
        assert_eq!(
            coerce_value(&json!("25/12/2023"), DataType::DateTime),
            json!("2023-12-25")
        );
        assert_eq!(
            coerce_value(&json!("2023-12-25"), DataType::DateTime2),
            json!("2023-12-25")
        );
        assert_eq!(
            coerce_value(&json!("2023-12-25 14:30:00"), DataType::DateTime),
            json!("2023-12-25")
        );
        assert_eq!(coerce_value(&json!("not a date"), DataType::DateTime), Value::Null);
    }

    #[test]
    fn text_coercion_stringifies_scalars() {
        assert_eq!(coerce_value(&json!(42), DataType::Text), json!("42"));
        assert_eq!(coerce_value(&json!(true), DataType::NVarchar), json!("true"));
        assert_eq!(coerce_value(&json!("kept"), DataType::Varchar), json!("kept"));
    }

    #[test]
    fn coercion_is_idempotent() {
        let cases = [
            (json!("25-12-2023"), DataType::DateTime),
            (json!("42"), DataType::Int),
            (json!("true"), DataType::Boolean),
            (json!(3.5), DataType::Double),
            (json!("free text"), DataType::Text),
            (json!("nonsense"), DataType::Int),
        ];
        for (input, dt) in cases {
            let once = coerce_value(&input, dt);
            let twice = coerce_value(&once, dt);
            assert_eq!(once, twice, "coercion not idempotent for {:?} {:?}", input, dt);
        }
    }

    #[test]
    fn uuid_coercion_normalizes() {
        let id = "A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11";
        assert_eq!(
            coerce_value(&json!(id), DataType::Uuid),
            json!(id.to_lowercase())
        );
        assert_eq!(coerce_value(&json!("nope"), DataType::Uuid), Value::Null);
    }
}
