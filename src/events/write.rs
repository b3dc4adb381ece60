use rusqlite::params;

use crate::common::db::DbConnection;
use crate::common::error::{ArchiveError, ArchiveResult};
use crate::events::tables;
use crate::events::BufferedEvent;

pub fn create_data_table(conn: &DbConnection) -> ArchiveResult<()> {
    conn.execute(tables::DATA_TABLE, [])
        .map_err(|e| ArchiveError::Schema(format!("couldn't create event table: {}", e)))?;
    Ok(())
}

pub fn insert_event(conn: &DbConnection, event: &BufferedEvent) -> ArchiveResult<()> {
    let query = "INSERT INTO data (eventId, value, tickId) VALUES (?, ?, ?)";

    let mut stmt = conn.prepare_cached(query)?;
    stmt.execute(params![event.event_id, event.value, event.tick_id])?;

    Ok(())
}
