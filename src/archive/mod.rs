//! Per-device time-series archive.
//!
//! One `data` table per file, keyed by `date`, with one nullable column per
//! tracked field. Columns are added with `ALTER TABLE` as fields get registered
//! and are never dropped.
//!
//! Schema changes go through the store's [`SerializationGate`] and fail fast with
//! [`ArchiveError::Busy`] while another one is running. Inserts and asof reads
//! only need the store to be initialized; they run against their own pooled
//! connection and never wait on the gate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::common::db::{self, DbPool};
use crate::common::error::{ArchiveError, ArchiveResult};
use crate::common::gate::SerializationGate;
use crate::common::model::{TrackedField, Value, ValueType};

pub mod columns;
mod read;
mod tables;
mod write;

pub use columns::ColumnType;

/// Answer to an asof query: the latest row at or before the requested date.
/// `value` is None when that row was written without the field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedValue {
    pub date: i64,
    pub value: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    Variable,
    CalculationElement,
}

#[derive(Default)]
struct FieldRegistry {
    variables: HashMap<String, TrackedField>,
    calculation_elements: HashMap<String, TrackedField>,
}

impl FieldRegistry {
    fn get(&self, id: &str) -> Option<&TrackedField> {
        self.variables
            .get(id)
            .or_else(|| self.calculation_elements.get(id))
    }

    /// A tracked field whose column SQLite would treat as the same one.
    fn column_owner(&self, column: &str) -> Option<&TrackedField> {
        self.variables
            .values()
            .chain(self.calculation_elements.values())
            .find(|field| field.column_name().eq_ignore_ascii_case(column))
    }

    fn fields_mut(&mut self, kind: FieldKind) -> &mut HashMap<String, TrackedField> {
        match kind {
            FieldKind::Variable => &mut self.variables,
            FieldKind::CalculationElement => &mut self.calculation_elements,
        }
    }
}

pub struct ValueStore {
    gate: SerializationGate,
    db: OnceLock<DbPool>,
    busy_timeout: Duration,
    registry: RwLock<FieldRegistry>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::with_busy_timeout(db::DEFAULT_BUSY_TIMEOUT)
    }

    /// `busy_timeout` is how long a connection waits on SQLite's own file lock.
    pub fn with_busy_timeout(busy_timeout: Duration) -> Self {
        ValueStore {
            gate: SerializationGate::new(),
            db: OnceLock::new(),
            busy_timeout,
            registry: RwLock::new(FieldRegistry::default()),
        }
    }

    /// Shorthand for [`ValueStore::new`] followed by [`ValueStore::init`].
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let store = Self::new();
        store.init(path)?;
        Ok(store)
    }

    /// Opens or creates the backing file. Existing rows and columns are kept.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn init(&self, path: impl AsRef<Path>) -> ArchiveResult<()> {
        let init = self.gate.begin_init()?;

        let pool = db::build_pool(path.as_ref(), self.busy_timeout)?;
        write::create_data_table(&pool.get()?)?;

        self.db
            .set(pool)
            .map_err(|_| ArchiveError::AlreadyInitialized)?;
        init.complete();

        info!("Archive ready");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn add_variable(&self, field: TrackedField) -> ArchiveResult<()> {
        self.add_field(field, FieldKind::Variable)
    }

    pub fn add_calculation_element(&self, field: TrackedField) -> ArchiveResult<()> {
        self.add_field(field, FieldKind::CalculationElement)
    }

    /// Forgets the field. Its column and data stay in the file.
    pub fn remove_variable(&self, id: &str) -> ArchiveResult<TrackedField> {
        self.remove_field(id, FieldKind::Variable)
    }

    pub fn remove_calculation_element(&self, id: &str) -> ArchiveResult<TrackedField> {
        self.remove_field(id, FieldKind::CalculationElement)
    }

    /// Appends one row. Ids that are not tracked are dropped from the payload,
    /// tracked fields missing from it are stored as NULL. A payload with no
    /// tracked id writes nothing.
    pub fn insert_values(&self, date: i64, payload: &HashMap<String, Value>) -> ArchiveResult<()> {
        let pool = self.pool()?;

        let mut values: Vec<(String, Value)> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            payload
                .iter()
                .filter_map(|(id, value)| match registry.get(id) {
                    Some(field) => Some((field.column_name(), *value)),
                    None => {
                        warn!("Dropping untracked id {} from payload at {}", id, date);
                        None
                    }
                })
                .collect()
        };

        if values.is_empty() {
            debug!("Nothing to archive at {}", date);
            return Ok(());
        }

        // Stable column order keeps the cached statement reusable across ticks
        values.sort_by(|a, b| a.0.cmp(&b.0));

        write::insert_row(&pool.get()?, date, &values)?;
        debug!("Archived {} values at {}", values.len(), date);

        Ok(())
    }

    pub fn get_value(&self, date: i64, id: &str) -> ArchiveResult<Option<ArchivedValue>> {
        let pool = self.pool()?;
        let field = self
            .field(id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))?;

        read::get_value_at(&pool.get()?, date, &field)
    }

    /// Probes the physical schema. Counts as a schema operation for the gate.
    pub fn does_column_exist(&self, column: &str) -> ArchiveResult<bool> {
        let _guard = self.gate.enter()?;
        read::column_exists(&self.pool()?.get()?, column)
    }

    pub fn field(&self, id: &str) -> Option<TrackedField> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn variables(&self) -> Vec<TrackedField> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.variables.values().cloned().collect()
    }

    pub fn calculation_elements(&self) -> Vec<TrackedField> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.calculation_elements.values().cloned().collect()
    }

    pub fn get_column_type(value_type: ValueType) -> ColumnType {
        columns::get_column_type(value_type)
    }

    pub fn get_column_name(field: &TrackedField) -> String {
        columns::get_column_name(field)
    }

    pub fn get_column_name_by_id(id: &str) -> String {
        columns::get_column_name_by_id(id)
    }

    fn pool(&self) -> ArchiveResult<&DbPool> {
        self.gate.ensure_ready()?;
        self.db.get().ok_or(ArchiveError::NotInitialized)
    }

    fn add_field(&self, field: TrackedField, kind: FieldKind) -> ArchiveResult<()> {
        let _guard = self.gate.enter()?;

        let column = columns::get_column_name(&field);

        {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if registry.get(&field.id).is_some() || registry.column_owner(&column).is_some() {
                return Err(ArchiveError::DuplicateField(field.id));
            }
        }

        let column_type = columns::get_column_type(field.value_type);
        let conn = self.pool()?.get()?;

        match read::get_column_type(&conn, &column)? {
            Some(declared) if declared.eq_ignore_ascii_case(column_type.as_sql()) => {
                debug!("Reusing existing column {} for {}", column, field.id);
            }
            Some(declared) => {
                warn!(
                    "Reusing column {} declared {} for {} field {}, older rows are read as {}",
                    column, declared, field.value_type, field.id, column_type
                );
            }
            None => {
                write::add_column(&conn, &column, column_type)?;
                debug!("Added column {} {}", column, column_type);
            }
        }

        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fields_mut(kind)
            .insert(field.id.clone(), field);

        Ok(())
    }

    fn remove_field(&self, id: &str, kind: FieldKind) -> ArchiveResult<TrackedField> {
        self.gate.ensure_ready()?;

        let removed = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fields_mut(kind)
            .remove(id)
            .ok_or_else(|| ArchiveError::NotFound(id.to_string()))?;

        debug!("Stopped tracking {}", id);
        Ok(removed)
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}
