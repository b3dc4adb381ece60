use rusqlite::types::Value as SqlValue;
use rusqlite::OptionalExtension;
use sql_builder::SqlBuilder;

use crate::archive::columns;
use crate::archive::tables;
use crate::archive::ArchivedValue;
use crate::common::db::DbConnection;
use crate::common::error::{ArchiveError, ArchiveResult};
use crate::common::model::TrackedField;

pub fn column_exists(conn: &DbConnection, column: &str) -> ArchiveResult<bool> {
    Ok(get_column_type(conn, column)?.is_some())
}

/// Declared type of an existing column, None when the column is missing.
pub fn get_column_type(conn: &DbConnection, column: &str) -> ArchiveResult<Option<String>> {
    let declared = conn
        .query_row(tables::COLUMN_TYPE, [column], |row| row.get(0))
        .optional()?;

    Ok(declared)
}

/// Latest row at or before `date`, None when `date` precedes the first sample.
pub fn get_value_at(
    conn: &DbConnection,
    date: i64,
    field: &TrackedField,
) -> ArchiveResult<Option<ArchivedValue>> {
    let query = SqlBuilder::select_from(tables::DATA_TABLE_NAME)
        .field("date")
        .field(columns::quote_identifier(&field.column_name()))
        .and_where("date <= ?")
        .order_desc("date")
        .limit(1)
        .sql()
        .map_err(|e| ArchiveError::Schema(e.to_string()))?;

    let mut stmt = conn.prepare_cached(&query)?;
    let row = stmt
        .query_row([date], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, SqlValue>(1)?))
        })
        .optional()?;

    let Some((found_date, raw_value)) = row else {
        return Ok(None);
    };

    let value = columns::decode_value(raw_value, field.value_type)?;

    Ok(Some(ArchivedValue {
        date: found_date,
        value,
    }))
}
