//! Dictionary term data types
//!
//! Fixed vocabulary shared by dictionary terms, the canonical-table type
//! map, and per-cell coercion during extraction. Parsing is
//! case-insensitive; anything outside the vocabulary maps to `Text`.

use serde::{Deserialize, Serialize};

/// Data type of one dictionary term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Int,
    NVarchar,
    Varchar,
    Text,
    Boolean,
    Float,
    Double,
    DateTime,
    DateTime2,
    Uuid,
}

impl DataType {
    /// Parse a term's declared data type, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INT" => Some(DataType::Int),
            "NVARCHAR" => Some(DataType::NVarchar),
            "VARCHAR" => Some(DataType::Varchar),
            "TEXT" => Some(DataType::Text),
            "BOOLEAN" => Some(DataType::Boolean),
            "FLOAT" => Some(DataType::Float),
            "DOUBLE" => Some(DataType::Double),
            "DATETIME" => Some(DataType::DateTime),
            "DATETIME2" => Some(DataType::DateTime2),
            "UUID" => Some(DataType::Uuid),
            _ => None,
        }
    }

    /// Parse with the vocabulary's fallback: unknown types become `Text`
    pub fn parse_or_text(s: &str) -> Self {
        Self::parse(s).unwrap_or(DataType::Text)
    }

    /// SQL type for canonical-table columns
    pub fn postgres_type(&self) -> &'static str {
        match self {
            DataType::Int => "INTEGER",
            DataType::NVarchar | DataType::Varchar | DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Float => "REAL",
            DataType::Double => "DOUBLE PRECISION",
            // Coercion normalizes all datetime inputs to plain dates
            DataType::DateTime | DataType::DateTime2 => "DATE",
            DataType::Uuid => "UUID",
        }
    }

    /// True for DATETIME and DATETIME2
    pub fn is_datetime(&self) -> bool {
        matches!(self, DataType::DateTime | DataType::DateTime2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(DataType::parse("int"), Some(DataType::Int));
        assert_eq!(DataType::parse("Nvarchar"), Some(DataType::NVarchar));
        assert_eq!(DataType::parse("DATETIME2"), Some(DataType::DateTime2));
        assert_eq!(DataType::parse(" uuid "), Some(DataType::Uuid));
        assert_eq!(DataType::parse("blob"), None);
    }

    #[test]
    fn unknown_types_fall_back_to_text() {
        assert_eq!(DataType::parse_or_text("decimal"), DataType::Text);
        assert_eq!(DataType::parse_or_text("").postgres_type(), "TEXT");
    }

    #[test]
    fn postgres_type_map() {
        assert_eq!(DataType::Int.postgres_type(), "INTEGER");
        assert_eq!(DataType::NVarchar.postgres_type(), "TEXT");
        assert_eq!(DataType::Float.postgres_type(), "REAL");
        assert_eq!(DataType::Double.postgres_type(), "DOUBLE PRECISION");
        assert_eq!(DataType::DateTime.postgres_type(), "DATE");
        assert_eq!(DataType::DateTime2.postgres_type(), "DATE");
        assert_eq!(DataType::Boolean.postgres_type(), "BOOLEAN");
        assert_eq!(DataType::Uuid.postgres_type(), "UUID");
    }

    #[test]
    fn datetime_detection() {
        assert!(DataType::DateTime.is_datetime());
        assert!(DataType::DateTime2.is_datetime());
        assert!(!DataType::Text.is_datetime());
    }
}
