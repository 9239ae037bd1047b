//! Process-wide store of tracked jobs.
//!
//! The registry is created at service startup and dropped at shutdown. It
//! owns every record it hands out; nothing is shared across processes and
//! nothing survives a restart. Storage sits behind [`JobStore`] so a durable
//! backend can replace [`InMemoryStore`] without touching callers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::JobId;
use super::handle::{Handle, Tracked};

/// Key-value storage behind a [`JobRegistry`].
pub trait JobStore<V>: Send + Sync {
    fn insert(&self, id: JobId, value: V);
    fn get(&self, id: &JobId) -> Option<V>;
    fn values(&self) -> Vec<V>;
    fn remove(&self, id: &JobId) -> Option<V>;
}

/// Concurrent in-memory [`JobStore`].
#[derive(Debug)]
pub struct InMemoryStore<V> {
    entries: RwLock<HashMap<JobId, V>>,
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone + Send + Sync> JobStore<V> for InMemoryStore<V> {
    fn insert(&self, id: JobId, value: V) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, value);
    }

    fn get(&self, id: &JobId) -> Option<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn values(&self) -> Vec<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn remove(&self, id: &JobId) -> Option<V> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

/// Registry of shared job handles. Cheap to clone.
pub struct JobRegistry<T> {
    store: Arc<dyn JobStore<Handle<T>>>,
}

impl<T> Clone for JobRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Tracked + Send + 'static> Default for JobRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tracked + Send + 'static> JobRegistry<T> {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::<Handle<T>>::default()))
    }

    pub fn with_store(store: Arc<dyn JobStore<Handle<T>>>) -> Self {
        Self { store }
    }

    /// Wraps `value` in a shared handle and stores it under its id.
    pub fn register(&self, value: T) -> Handle<T> {
        let handle = Handle::new(value);
        self.store.insert(handle.id(), handle.clone());
        handle
    }

    pub fn get(&self, id: &JobId) -> Option<Handle<T>> {
        self.store.get(id)
    }

    /// Snapshot of every registered handle, in no particular order.
    pub fn list(&self) -> Vec<Handle<T>> {
        self.store.values()
    }

    pub fn list_by_status(&self, status: T::Status) -> Vec<Handle<T>> {
        self.store
            .values()
            .into_iter()
            .filter(|handle| handle.status() == status)
            .collect()
    }

    pub fn remove(&self, id: &JobId) -> Option<Handle<T>> {
        self.store.remove(id)
    }
}
