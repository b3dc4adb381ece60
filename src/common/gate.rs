//! Initialization and exclusivity guard shared by the stores.
//!
//! A gate moves `Uninitialized -> Initializing -> Ready`. Mutating operations
//! take the busy lock without waiting: if another holder is in flight they fail
//! with [`ArchiveError::Busy`] instead of queueing. The lock is released when the
//! returned guard drops, on every exit path.
//!
//! There is no timeout. A holder stuck inside a storage call keeps the gate busy
//! until it returns.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::common::error::{ArchiveError, ArchiveResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug)]
pub struct SerializationGate {
    state: Mutex<GateState>,
    busy: Mutex<()>,
}

/// Held while a mutating operation runs.
pub struct BusyGuard<'a> {
    _lock: MutexGuard<'a, ()>,
}

/// Held while a store initializes. Dropping it without calling
/// [`InitGuard::complete`] rolls the gate back to `Uninitialized`.
pub struct InitGuard<'a> {
    gate: &'a SerializationGate,
    _lock: MutexGuard<'a, ()>,
    completed: bool,
}

impl SerializationGate {
    pub fn new() -> Self {
        SerializationGate {
            state: Mutex::new(GateState::Uninitialized),
            busy: Mutex::new(()),
        }
    }

    pub fn state(&self) -> GateState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == GateState::Ready
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.busy.try_lock(), Err(TryLockError::WouldBlock))
    }

    pub fn ensure_ready(&self) -> ArchiveResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ArchiveError::NotInitialized)
        }
    }

    pub fn begin_init(&self) -> ArchiveResult<InitGuard<'_>> {
        let lock = self.try_lock_busy()?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != GateState::Uninitialized {
            return Err(ArchiveError::AlreadyInitialized);
        }
        *state = GateState::Initializing;

        Ok(InitGuard {
            gate: self,
            _lock: lock,
            completed: false,
        })
    }

    pub fn enter(&self) -> ArchiveResult<BusyGuard<'_>> {
        self.ensure_ready()?;
        let lock = self.try_lock_busy()?;
        Ok(BusyGuard { _lock: lock })
    }

    fn try_lock_busy(&self) -> ArchiveResult<MutexGuard<'_, ()>> {
        match self.busy.try_lock() {
            Ok(lock) => Ok(lock),
            // The lock guards no data, a panicked holder leaves nothing half-written
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(ArchiveError::Busy),
        }
    }

    fn set_state(&self, new_state: GateState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = new_state;
    }
}

impl Default for SerializationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGuard<'_> {
    pub fn complete(mut self) {
        self.gate.set_state(GateState::Ready);
        self.completed = true;
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.gate.set_state(GateState::Uninitialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_use_before_init() {
        let gate = SerializationGate::new();
        assert!(matches!(gate.enter(), Err(ArchiveError::NotInitialized)));
        assert!(matches!(gate.ensure_ready(), Err(ArchiveError::NotInitialized)));
    }

    #[test]
    fn test_init_lifecycle() {
        let gate = SerializationGate::new();

        let init = gate.begin_init().unwrap();
        assert_eq!(gate.state(), GateState::Initializing);
        assert!(gate.is_busy());
        init.complete();

        assert!(gate.is_initialized());
        assert!(!gate.is_busy());
        assert!(matches!(
            gate.begin_init(),
            Err(ArchiveError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_failed_init_rolls_back() {
        let gate = SerializationGate::new();
        {
            let _init = gate.begin_init().unwrap();
        }
        assert_eq!(gate.state(), GateState::Uninitialized);
        assert!(!gate.is_busy());
        assert!(gate.begin_init().is_ok());
    }

    #[test]
    fn test_second_holder_is_rejected() {
        let gate = SerializationGate::new();
        gate.begin_init().unwrap().complete();

        let guard = gate.enter().unwrap();
        assert!(matches!(gate.enter(), Err(ArchiveError::Busy)));
        drop(guard);

        assert!(gate.enter().is_ok());
    }
}
