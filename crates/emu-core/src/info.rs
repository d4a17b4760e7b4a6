//! Shared, lock-protected copies of unit state for inspector threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A published copy of some unit's state.
///
/// The simulation thread calls [`InfoCell::publish`] with a fresh copy; any
/// number of cloned handles may [`InfoCell::read`] it from other threads.
/// Readers always see a complete snapshot, never the live state. Each unit
/// owns its own cell, so there is one lock per unit.
#[derive(Debug, Default)]
pub struct InfoCell<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for InfoCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> InfoCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    /// Replace the published copy.
    pub fn publish(&self, info: T) {
        *self.lock() = info;
    }

    /// Copy of the most recently published state.
    #[must_use]
    pub fn read(&self) -> T {
        self.lock().clone()
    }

    // A panicking reader cannot leave a half-written copy behind: publish
    // is a single assignment.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
