use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::common::error::ArchiveResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (creating if needed) the file behind a store. Readers and the writer
/// get separate pooled connections, WAL keeps them from blocking each other.
/// `busy_timeout` also bounds how long opening the pool waits for a connection.
#[instrument]
pub fn build_pool(path: &Path, busy_timeout: Duration) -> ArchiveResult<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
    });

    let pool = Pool::builder()
        .connection_timeout(busy_timeout)
        .build(manager)?;
    debug!("Opened pool for {}", path.to_string_lossy());

    Ok(pool)
}
