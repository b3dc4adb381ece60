pub mod archive;
pub mod common;
pub mod daemon;
pub mod events;

pub use archive::{ArchivedValue, ValueStore};
pub use common::error::{ArchiveError, ArchiveResult};
pub use common::model::{TrackedField, Value, ValueType};
pub use events::{BufferedEvent, EventRingBuffer, TickValue};
