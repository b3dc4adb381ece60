use thiserror::Error;

/// Errors returned by the archive and event stores.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("store is not initialized")]
    NotInitialized,

    #[error("store is already initialized")]
    AlreadyInitialized,

    /// Another schema change or event batch is in flight on the same store
    #[error("store is busy with another operation")]
    Busy,

    #[error("field {0} is already tracked")]
    DuplicateField(String),

    #[error("field {0} is not tracked")]
    NotFound(String),

    #[error("unrecognized value type: {0}")]
    UnrecognizedType(String),

    #[error("storage error: {0}")]
    StorageIo(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("batch of {len} events exceeds buffer capacity of {capacity}")]
    BatchTooLarge { len: usize, capacity: usize },

    #[error("invalid buffer capacity: {0}")]
    InvalidCapacity(usize),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
