use rusqlite::ToSql;
use sql_builder::SqlBuilder;

use crate::archive::columns::{self, ColumnType};
use crate::archive::tables;
use crate::common::db::DbConnection;
use crate::common::error::{ArchiveError, ArchiveResult};
use crate::common::model::Value;

pub fn create_data_table(conn: &DbConnection) -> ArchiveResult<()> {
    conn.execute(tables::DATA_TABLE, [])
        .map_err(|e| ArchiveError::Schema(format!("couldn't create data table: {}", e)))?;
    Ok(())
}

pub fn add_column(conn: &DbConnection, column: &str, column_type: ColumnType) -> ArchiveResult<()> {
    let query = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        tables::DATA_TABLE_NAME,
        columns::quote_identifier(column),
        column_type.as_sql()
    );

    conn.execute(&query, [])
        .map_err(|e| ArchiveError::Schema(format!("couldn't add column {}: {}", column, e)))?;
    Ok(())
}

/// `values` must be non-empty; a row holding only a date is never written.
pub fn insert_row(conn: &DbConnection, date: i64, values: &[(String, Value)]) -> ArchiveResult<()> {
    let mut builder = SqlBuilder::insert_into(tables::DATA_TABLE_NAME);
    builder.field("date");

    let mut placeholders = vec!["?"];
    for (column, _) in values {
        builder.field(columns::quote_identifier(column));
        placeholders.push("?");
    }
    builder.values(placeholders.as_slice());

    let query = builder
        .sql()
        .map_err(|e| ArchiveError::Schema(e.to_string()))?;

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
    params.push(&date);
    for (_, value) in values {
        params.push(value);
    }

    let mut stmt = conn.prepare_cached(&query)?;
    stmt.execute(params.as_slice())?;

    Ok(())
}
