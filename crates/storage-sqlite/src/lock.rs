//! Per-alias reader/writer lock.
//!
//! Any number of readers may hold the lock together; a writer holds it alone.
//! Writers are preferred: once a writer is queued, newly arriving readers wait
//! behind it, so sustained read traffic cannot starve a sync. The lock is not
//! reentrant. A thread holding read access must release it before asking for
//! write access on the same alias, or it deadlocks.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use wcmkt_core::DatabaseAlias;

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// Point-in-time view of a lock, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockSnapshot {
    pub readers: usize,
    pub writer_held: bool,
    pub waiting_writers: usize,
}

impl LockSnapshot {
    pub fn is_free(&self) -> bool {
        self.readers == 0 && !self.writer_held
    }
}

#[derive(Debug, Default)]
pub struct ReaderWriterLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl ReaderWriterLock {
    pub fn new() -> Self {
        Self::default()
    }

    // Nothing panics while the state mutex is held, so a poisoned state is
    // still consistent.
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_blocked(state: &LockState) -> bool {
        state.writer || state.waiting_writers > 0
    }

    fn write_blocked(state: &LockState) -> bool {
        state.writer || state.readers > 0
    }

    /// Blocks while a writer holds or is queued for the lock.
    /// Pair with [`release_read`](Self::release_read); prefer [`read`](Self::read).
    pub fn acquire_read(&self) {
        let guard = self.state();
        let mut state = self
            .changed
            .wait_while(guard, |s| Self::read_blocked(s))
            .unwrap_or_else(PoisonError::into_inner);
        state.readers += 1;
    }

    pub fn release_read(&self) {
        let mut state = self.state();
        debug_assert!(state.readers > 0, "release_read without a matching acquire");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.changed.notify_all();
        }
    }

    /// Queues as a writer, then blocks until every reader has drained.
    /// Pair with [`release_write`](Self::release_write); prefer [`write`](Self::write).
    pub fn acquire_write(&self) {
        let mut state = self.state();
        state.waiting_writers += 1;
        let mut state = self
            .changed
            .wait_while(state, |s| Self::write_blocked(s))
            .unwrap_or_else(PoisonError::into_inner);
        state.waiting_writers -= 1;
        state.writer = true;
    }

    pub fn release_write(&self) {
        let mut state = self.state();
        debug_assert!(state.writer, "release_write without a matching acquire");
        state.writer = false;
        self.changed.notify_all();
    }

    /// Like [`acquire_read`](Self::acquire_read) but gives up after `timeout`.
    pub fn try_acquire_read_for(&self, timeout: Duration) -> bool {
        let guard = self.state();
        let (mut state, result) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| Self::read_blocked(s))
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && Self::read_blocked(&state) {
            return false;
        }
        state.readers += 1;
        true
    }

    /// Like [`acquire_write`](Self::acquire_write) but gives up after `timeout`.
    /// A writer that gives up leaves the queue and wakes any readers it held back.
    pub fn try_acquire_write_for(&self, timeout: Duration) -> bool {
        let mut state = self.state();
        state.waiting_writers += 1;
        let (mut state, result) = self
            .changed
            .wait_timeout_while(state, timeout, |s| Self::write_blocked(s))
            .unwrap_or_else(PoisonError::into_inner);
        state.waiting_writers -= 1;
        if result.timed_out() && Self::write_blocked(&state) {
            self.changed.notify_all();
            return false;
        }
        state.writer = true;
        true
    }

    pub fn read(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard { lock: self }
    }

    pub fn write(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard { lock: self }
    }

    pub fn try_read_for(&self, timeout: Duration) -> Option<ReadGuard<'_>> {
        self.try_acquire_read_for(timeout)
            .then(|| ReadGuard { lock: self })
    }

    pub fn try_write_for(&self, timeout: Duration) -> Option<WriteGuard<'_>> {
        self.try_acquire_write_for(timeout)
            .then(|| WriteGuard { lock: self })
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.state();
        LockSnapshot {
            readers: state.readers,
            writer_held: state.writer,
            waiting_writers: state.waiting_writers,
        }
    }
}

/// Shared read access; released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ReaderWriterLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive write access; released on drop.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ReaderWriterLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

/// One lock per alias, created on first request and shared by every caller.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<DatabaseAlias, Arc<ReaderWriterLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, alias: DatabaseAlias) -> Arc<ReaderWriterLock> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(alias).or_default())
    }

    pub fn snapshot(&self, alias: DatabaseAlias) -> LockSnapshot {
        self.lock_for(alias).snapshot()
    }
}
