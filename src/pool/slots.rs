//! Counting gate over a fixed number of reusable items.
//!
//! Checkout waits on a `may` semaphore, so a coroutine that finds every slot
//! busy parks itself and leaves its worker thread free to run the coroutines
//! that will eventually hand a slot back.

use may::sync::Semphore;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Why [`Slots::take`] came back empty-handed.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TakeError<E> {
    /// No slot was handed back within the timeout.
    Timeout,
    /// The slot was vacant or unhealthy and opening a replacement failed.
    Open(E),
}

/// A stack of live items plus vacancies left by items that could not be
/// replaced. The semaphore counts both, so capacity never shrinks.
pub(crate) struct Slots<T> {
    stack: Mutex<Vec<Option<T>>>,
    available: Semphore,
    capacity: usize,
}

impl<T> Slots<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        let capacity = items.len();
        Self {
            stack: Mutex::new(items.into_iter().map(Some).collect()),
            available: Semphore::new(capacity),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<T>>> {
        // The guard is never held across a yield point or a panic site.
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for a slot. A live item that fails `healthy`, or
    /// a vacancy, is replaced with a fresh one from `open`.
    pub(crate) fn take<E>(
        &self,
        timeout: Duration,
        healthy: impl FnOnce(&T) -> bool,
        open: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, TakeError<E>> {
        if !self.available.wait_timeout(timeout) {
            return Err(TakeError::Timeout);
        }

        let slot = self.lock().pop().flatten();
        if let Some(item) = slot {
            if healthy(&item) {
                return Ok(item);
            }
        }

        open().map_err(|e| {
            self.vacate();
            TakeError::Open(e)
        })
    }

    /// Hand an item back and wake one waiter.
    pub(crate) fn put(&self, item: T) {
        self.lock().push(Some(item));
        self.available.post();
    }

    /// Give the slot back without an item. Vacancies sit at the bottom so
    /// live items are handed out first.
    fn vacate(&self) {
        self.lock().insert(0, None);
        self.available.post();
    }

    /// Slots currently not checked out, vacancies included.
    pub(crate) fn idle(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
