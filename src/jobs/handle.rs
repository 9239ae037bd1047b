use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::JobId;

/// A record that can live in a [`JobRegistry`](super::JobRegistry).
pub trait Tracked {
    type Status: Copy + PartialEq + Send + 'static;

    fn id(&self) -> JobId;
    fn status(&self) -> Self::Status;
    fn is_terminal(&self) -> bool;

    /// Forces the record into its failed state after an unhandled fault.
    /// Returns `false` when the record was already terminal.
    fn fault(&mut self, error: String) -> bool;
}

/// Shared, lock-guarded access to one tracked record.
///
/// Every read and mutation goes through the same mutex, so a status check and
/// the write that depends on it happen atomically. This is what keeps a late
/// stage result from overwriting a concurrent cancel.
#[derive(Debug)]
pub struct Handle<T> {
    id: JobId,
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Handle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl<T: Tracked> Handle<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: value.id(),
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn status(&self) -> T::Status {
        self.lock().status()
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().is_terminal()
    }

    /// Runs `f` with exclusive access to the record.
    pub fn with<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.lock().clone()
    }

    // A panic while holding the lock cannot leave a record half-written
    // (all mutations are single assignments), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
