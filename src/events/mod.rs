//! Bounded event buffer backed by a durable log.
//!
//! Every accepted event is written to the `data` table before it shows up in
//! memory. Memory keeps only the `buffer_size` newest events, the file keeps
//! all of them. Event ids grow strictly, also across restarts: on init the next
//! id is derived from the highest id in the file, not from the retained window.
//!
//! Batches go through [`EventRingBuffer::refresh_events`], which owns the
//! store's gate for its whole run. A second batch arriving meanwhile is rejected
//! with [`ArchiveError::Busy`] and writes nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::common::db::{self, DbPool};
use crate::common::error::{ArchiveError, ArchiveResult};
use crate::common::gate::SerializationGate;

mod read;
mod tables;
mod write;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedEvent {
    pub event_id: i64,
    pub tick_id: i64,
    pub value: i64,
}

/// One entry of an incoming batch. Values of zero or less mean "no event".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickValue {
    pub tick_id: i64,
    pub value: i64,
}

#[derive(Default)]
struct BufferState {
    buffer_size: usize,
    last_event_id: i64,
    content: BTreeMap<i64, BufferedEvent>,
}

pub struct EventRingBuffer {
    gate: SerializationGate,
    db: OnceLock<DbPool>,
    busy_timeout: Duration,
    state: Mutex<BufferState>,
}

impl EventRingBuffer {
    pub fn new() -> Self {
        Self::with_busy_timeout(db::DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(busy_timeout: Duration) -> Self {
        EventRingBuffer {
            gate: SerializationGate::new(),
            db: OnceLock::new(),
            busy_timeout,
            state: Mutex::new(BufferState::default()),
        }
    }

    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> ArchiveResult<Self> {
        let buffer = Self::new();
        buffer.init(path, buffer_size)?;
        Ok(buffer)
    }

    /// Opens or creates the log and rebuilds the in-memory window from it.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn init(&self, path: impl AsRef<Path>, buffer_size: usize) -> ArchiveResult<()> {
        if buffer_size == 0 {
            return Err(ArchiveError::InvalidCapacity(buffer_size));
        }

        let init = self.gate.begin_init()?;

        let pool = db::build_pool(path.as_ref(), self.busy_timeout)?;
        let conn = pool.get()?;

        write::create_data_table(&conn)?;
        let last_event_id = read::get_last_event_id(&conn)?;
        let window = read::get_latest_events(&conn, buffer_size)?;
        drop(conn);

        let restored = window.len();
        {
            let mut state = self.lock_state();
            state.buffer_size = buffer_size;
            state.last_event_id = last_event_id;
            state.content = window
                .into_iter()
                .map(|event| (event.event_id, event))
                .collect();
        }

        self.db
            .set(pool)
            .map_err(|_| ArchiveError::AlreadyInitialized)?;
        init.complete();

        info!(
            "Event buffer ready, restored {} events, last id {}",
            restored, last_event_id
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Stores a batch in order and returns the events that were accepted.
    ///
    /// The whole batch is rejected if it can't fit in the window or if another
    /// batch is being stored. A storage failure stops the batch: events written
    /// before it stay written and stay in the window.
    pub fn refresh_events(&self, batch: &[TickValue]) -> ArchiveResult<Vec<BufferedEvent>> {
        let _guard = self.gate.enter()?;

        let capacity = self.buffer_size();
        if batch.len() > capacity {
            return Err(ArchiveError::BatchTooLarge {
                len: batch.len(),
                capacity,
            });
        }

        let mut stored = Vec::with_capacity(batch.len());
        for tick_value in batch {
            if let Some(event) = self.add_event(tick_value.tick_id, tick_value.value)? {
                stored.push(event);
            }
        }

        debug!(
            "Stored {} of {} events from batch",
            stored.len(),
            batch.len()
        );
        Ok(stored)
    }

    /// Retained events, oldest first.
    pub fn content(&self) -> Vec<BufferedEvent> {
        self.lock_state().content.values().copied().collect()
    }

    /// Retained events with an id greater than `event_id`, oldest first.
    pub fn content_since(&self, event_id: i64) -> Vec<BufferedEvent> {
        self.lock_state()
            .content
            .range(event_id.saturating_add(1)..)
            .map(|(_, event)| *event)
            .collect()
    }

    pub fn last_event_id(&self) -> i64 {
        self.lock_state().last_event_id
    }

    /// Zero until the buffer is initialized.
    pub fn buffer_size(&self) -> usize {
        self.lock_state().buffer_size
    }

    /// Persists one event and then mirrors it in memory. Doesn't take the gate,
    /// callers outside `refresh_events` must serialize themselves.
    fn add_event(&self, tick_id: i64, value: i64) -> ArchiveResult<Option<BufferedEvent>> {
        if value <= 0 {
            debug!("Dropping non-positive event {} at tick {}", value, tick_id);
            return Ok(None);
        }

        let pool = self.pool()?;
        let mut state = self.lock_state();

        let event = BufferedEvent {
            event_id: state.last_event_id + 1,
            tick_id,
            value,
        };

        write::insert_event(&pool.get()?, &event)?;

        state.last_event_id = event.event_id;
        state.content.insert(event.event_id, event);
        while state.content.len() > state.buffer_size {
            state.content.pop_first();
        }

        Ok(Some(event))
    }

    fn pool(&self) -> ArchiveResult<&DbPool> {
        self.gate.ensure_ready()?;
        self.db.get().ok_or(ArchiveError::NotInitialized)
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
