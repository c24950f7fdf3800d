//! Record store adapter abstraction.

use crate::record::Record;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Error reported by a record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    /// Creates a store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Local persistence for one entity type.
///
/// Implemented by the storage layer; the engine only needs to list every
/// record, write one back and physically remove one.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Lists every record, including tombstones.
    async fn list_all(&self) -> StoreResult<Vec<Record>>;

    /// Inserts or replaces a record by local id.
    async fn update(&self, record: &Record) -> StoreResult<()>;

    /// Physically removes a record by local id.
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// An in-memory record store.
///
/// Records are kept ordered by local id. Failures can be injected to
/// exercise the engine's local-error paths.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
    fail_list: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: Record) {
        self.records.write().insert(record.id.clone(), record);
    }

    /// Returns a record by local id.
    pub fn get(&self, id: &str) -> Option<Record> {
        self.records.read().get(id).cloned()
    }

    /// Applies `f` to a stored record, if present.
    pub fn modify<F: FnOnce(&mut Record)>(&self, id: &str, f: F) -> bool {
        match self.records.write().get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Returns every record.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.read().values().cloned().collect()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Makes `list_all` fail.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Makes `update` and `delete` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_all(&self) -> StoreResult<Vec<Record>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::new("store unavailable"));
        }
        Ok(self.snapshot())
    }

    async fn update(&self, record: &Record) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::new("store is read-only"));
        }
        self.insert(record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::new("store is read-only"));
        }
        self.records.write().remove(id);
        Ok(())
    }
}
