//! Coordination with direct (non-sweep) write paths.
//!
//! Some screens submit a record straight to the backend before it is
//! persisted locally. While that write is in flight the sweep must not send
//! the same content a second time.

use crate::record::{EntityType, Record};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers whether a logical operation is already in flight elsewhere.
pub trait PendingOperations: Send + Sync {
    /// Returns true if content with `content_hash` is being written by
    /// another path.
    fn is_pending(&self, entity: &EntityType, content_hash: &str) -> bool;
}

/// A predicate that never reports pending operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPendingOperations;

impl PendingOperations for NoPendingOperations {
    fn is_pending(&self, _entity: &EntityType, _content_hash: &str) -> bool {
        false
    }
}

/// Registry of in-flight direct writes.
///
/// A direct-write path calls [`PendingRegistry::begin`] and holds the
/// returned guard until its request settles.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<Mutex<HashMap<(EntityType, String), usize>>>,
}

impl PendingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` as being written by a direct path.
    pub fn begin(&self, entity: &EntityType, record: &Record) -> PendingGuard {
        let key = (entity.clone(), record.content_hash());
        *self.inner.lock().entry(key.clone()).or_insert(0) += 1;
        PendingGuard {
            registry: self.clone(),
            key,
        }
    }

    /// Returns the number of distinct in-flight operations.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn release(&self, key: &(EntityType, String)) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                inner.remove(key);
            }
        }
    }
}

impl PendingOperations for PendingRegistry {
    fn is_pending(&self, entity: &EntityType, content_hash: &str) -> bool {
        self.inner
            .lock()
            .contains_key(&(entity.clone(), content_hash.to_string()))
    }
}

/// Marks an operation as in flight until dropped.
#[derive(Debug)]
pub struct PendingGuard {
    registry: PendingRegistry,
    key: (EntityType, String),
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}
