use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::error::ArchiveError;

const COLUMN_PREFIX: &str = "col_";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
}

impl FromStr for ValueType {
    type Err = ArchiveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "integer" | "int" => Ok(ValueType::Integer),
            "float" | "real" => Ok(ValueType::Float),
            _ => Err(ArchiveError::UnrecognizedType(raw.to_string())),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = ArchiveError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ValueType> for String {
    fn from(value_type: ValueType) -> Self {
        value_type.to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    FloatingPoint(f64),
    Boolean(bool),
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match *self {
            Value::Integer(integer) => ToSqlOutput::from(integer),
            Value::FloatingPoint(floating) => ToSqlOutput::from(floating),
            // Booleans live in INTEGER columns
            Value::Boolean(boolean) => ToSqlOutput::from(boolean as i64),
        };
        Ok(output)
    }
}

/// An archived quantity, either a device variable or a computed element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedField {
    pub id: String,
    pub value_type: ValueType,
}

impl TrackedField {
    pub fn new(id: impl Into<String>, value_type: ValueType) -> Self {
        TrackedField {
            id: id.into(),
            value_type,
        }
    }

    pub fn column_name(&self) -> String {
        column_name_by_id(&self.id)
    }
}

/// The id is expected to already be a safe identifier fragment.
pub fn column_name_by_id(id: &str) -> String {
    format!("{COLUMN_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_parsing() {
        assert_eq!("boolean".parse::<ValueType>().unwrap(), ValueType::Boolean);
        assert_eq!("Integer".parse::<ValueType>().unwrap(), ValueType::Integer);
        assert_eq!("float".parse::<ValueType>().unwrap(), ValueType::Float);

        let err = "string".parse::<ValueType>().unwrap_err();
        assert!(matches!(err, ArchiveError::UnrecognizedType(name) if name == "string"));
    }

    #[test]
    fn test_field_deserialization() {
        let field: TrackedField =
            serde_json::from_str(r#"{"id": "temp", "value_type": "float"}"#).unwrap();
        assert_eq!(field, TrackedField::new("temp", ValueType::Float));
        assert_eq!(field.column_name(), "col_temp");

        let bad = serde_json::from_str::<TrackedField>(r#"{"id": "x", "value_type": "blob"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_untagged_values() {
        let values: Vec<Value> = serde_json::from_str("[5, 2.5, true]").unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(5),
                Value::FloatingPoint(2.5),
                Value::Boolean(true)
            ]
        );
    }
}
