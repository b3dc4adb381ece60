use rusqlite::params;

use crate::common::db::DbConnection;
use crate::common::error::ArchiveResult;
use crate::events::BufferedEvent;

/// Highest id ever persisted, including rows outside the retained window.
pub fn get_last_event_id(conn: &DbConnection) -> ArchiveResult<i64> {
    let last_event_id: i64 =
        conn.query_row("SELECT COALESCE(MAX(eventId), 0) FROM data", [], |row| {
            row.get(0)
        })?;

    Ok(last_event_id)
}

/// The `limit` most recent positive events, oldest first.
pub fn get_latest_events(conn: &DbConnection, limit: usize) -> ArchiveResult<Vec<BufferedEvent>> {
    let mut stmt = conn.prepare(
        "SELECT eventId, tickId, value
         FROM data
         WHERE value > 0
         ORDER BY eventId DESC
         LIMIT ?",
    )?;

    let mut rows = stmt.query(params![limit as i64])?;

    let mut result = vec![];

    while let Some(row) = rows.next()? {
        result.push(BufferedEvent {
            event_id: row.get(0)?,
            tick_id: row.get(1)?,
            value: row.get(2)?,
        });
    }

    result.reverse();

    Ok(result)
}
