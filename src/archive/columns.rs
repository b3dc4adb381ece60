use rusqlite::types::Value as SqlValue;
use std::fmt;

use crate::common::error::{ArchiveError, ArchiveResult};
use crate::common::model::{self, TrackedField, Value, ValueType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

pub fn get_column_type(value_type: ValueType) -> ColumnType {
    match value_type {
        ValueType::Boolean | ValueType::Integer => ColumnType::Integer,
        ValueType::Float => ColumnType::Real,
    }
}

pub fn get_column_name(field: &TrackedField) -> String {
    field.column_name()
}

pub fn get_column_name_by_id(id: &str) -> String {
    model::column_name_by_id(id)
}

pub fn quote_identifier(column: &str) -> String {
    format!("\"{}\"", column)
}

/// Turns what SQLite returned for a field column back into a typed value.
/// NULL means the field was absent from the payload of that row.
pub fn decode_value(raw: SqlValue, value_type: ValueType) -> ArchiveResult<Option<Value>> {
    let value = match (raw, value_type) {
        (SqlValue::Null, _) => return Ok(None),

        (SqlValue::Integer(integer), ValueType::Boolean) => Value::Boolean(integer != 0),
        (SqlValue::Real(real), ValueType::Boolean) => Value::Boolean(real != 0.0),

        (SqlValue::Integer(integer), ValueType::Integer) => Value::Integer(integer),
        // INTEGER affinity keeps reals that have a fractional part
        (SqlValue::Real(real), ValueType::Integer) => Value::FloatingPoint(real),

        (SqlValue::Integer(integer), ValueType::Float) => Value::FloatingPoint(integer as f64),
        (SqlValue::Real(real), ValueType::Float) => Value::FloatingPoint(real),

        (other, value_type) => {
            return Err(ArchiveError::Schema(format!(
                "column holds {} but field is {}",
                other.data_type(),
                value_type
            )))
        }
    };

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_types() {
        assert_eq!(get_column_type(ValueType::Boolean), ColumnType::Integer);
        assert_eq!(get_column_type(ValueType::Integer), ColumnType::Integer);
        assert_eq!(get_column_type(ValueType::Float), ColumnType::Real);
        assert_eq!(ColumnType::Real.to_string(), "REAL");
    }

    #[test]
    fn test_column_names() {
        let field = TrackedField::new("pump_speed", ValueType::Float);
        assert_eq!(get_column_name(&field), "col_pump_speed");
        assert_eq!(get_column_name_by_id("42"), "col_42");
        assert_eq!(quote_identifier("col_42"), "\"col_42\"");
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value(SqlValue::Null, ValueType::Float).unwrap(), None);
        assert_eq!(
            decode_value(SqlValue::Integer(1), ValueType::Boolean).unwrap(),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            decode_value(SqlValue::Integer(3), ValueType::Float).unwrap(),
            Some(Value::FloatingPoint(3.0))
        );
        assert!(decode_value(SqlValue::Text("x".to_string()), ValueType::Integer).is_err());
    }
}
