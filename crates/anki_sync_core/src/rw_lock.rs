//! crates/anki_sync_core/src/rw_lock.rs
//!
//! A readers-writer lock following the first readers-writers discipline:
//! the first reader in shuts writers out, the last reader out lets them back in,
//! and a writer holds the value exclusively for its whole critical section.
//!
//! Readers are preferred. A steady stream of readers can starve a waiting writer;
//! callers rely on that ordering, so it is kept as is.

use parking_lot::{Condvar, Mutex, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};

//=========================================================================================
// The Gate (counting reader + writer flag)
//=========================================================================================

#[derive(Debug, Default)]
struct GateState {
    readers: usize,
    writer: bool,
}

/// The bare locking protocol, without any protected value.
#[derive(Debug, Default)]
pub struct ReaderWriterGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl ReaderWriterGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters as a reader. Only an active writer blocks; queued writers do not.
    pub fn acquire_read(&self) {
        let mut state = self.state.lock();
        while state.writer {
            self.released.wait(&mut state);
        }
        state.readers += 1;
    }

    pub fn release_read(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers > 0, "release_read without a matching acquire_read");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.released.notify_all();
        }
    }

    /// Enters as the single writer once every reader and writer has left.
    pub fn acquire_write(&self) {
        let mut state = self.state.lock();
        while state.writer || state.readers > 0 {
            self.released.wait(&mut state);
        }
        state.writer = true;
    }

    pub fn release_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writer, "release_write without a matching acquire_write");
        state.writer = false;
        self.released.notify_all();
    }
}

//=========================================================================================
// RwLock<T> and its guards
//=========================================================================================

/// A value guarded by a [`ReaderWriterGate`].
///
/// The gate decides who may enter. The value sits in a `parking_lot::RwLock`
/// that is only ever taken after the gate admits the caller, so it never blocks
/// and never reorders the gate's reader preference.
pub struct RwLock<T> {
    gate: ReaderWriterGate,
    value: parking_lot::RwLock<T>,
}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            gate: ReaderWriterGate::new(),
            value: parking_lot::RwLock::new(value),
        }
    }

    pub fn read(&self) -> ReadGuard<'_, T> {
        let slot = ReaderSlot::enter(&self.gate);
        ReadGuard {
            value: self.value.read(),
            _slot: slot,
        }
    }

    pub fn write(&self) -> WriteGuard<'_, T> {
        let slot = WriterSlot::enter(&self.gate);
        WriteGuard {
            value: self.value.write(),
            _slot: slot,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwLock").field("gate", &self.gate).finish_non_exhaustive()
    }
}

/// A held reader slot on the gate, released on drop.
struct ReaderSlot<'a>(&'a ReaderWriterGate);

impl<'a> ReaderSlot<'a> {
    fn enter(gate: &'a ReaderWriterGate) -> Self {
        gate.acquire_read();
        Self(gate)
    }
}

impl Drop for ReaderSlot<'_> {
    fn drop(&mut self) {
        self.0.release_read();
    }
}

/// The gate's writer flag, released on drop.
struct WriterSlot<'a>(&'a ReaderWriterGate);

impl<'a> WriterSlot<'a> {
    fn enter(gate: &'a ReaderWriterGate) -> Self {
        gate.acquire_write();
        Self(gate)
    }
}

impl Drop for WriterSlot<'_> {
    fn drop(&mut self) {
        self.0.release_write();
    }
}

// Fields drop in declaration order: the inner guard goes before the gate slot, so
// whoever the gate admits next finds the inner lock already free.

pub struct ReadGuard<'a, T> {
    value: RwLockReadGuard<'a, T>,
    _slot: ReaderSlot<'a>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

pub struct WriteGuard<'a, T> {
    value: RwLockWriteGuard<'a, T>,
    _slot: WriterSlot<'a>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
