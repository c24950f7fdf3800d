//! Server-side document storage.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tillsync_protocol::{OutboundItem, SyncAction};

/// A document as stored by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Backend identity.
    pub remote_id: String,
    /// Seller the document belongs to.
    pub seller: String,
    /// Entity type it was submitted as.
    pub entity_type: String,
    /// Device-local identity it was submitted with.
    pub local_id: String,
    /// Latest payload.
    pub fields: Map<String, Value>,
    /// Number of accepted writes.
    pub version: u64,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, StoredDocument>,
    by_local: HashMap<(String, String, String), String>,
}

/// Documents keyed by remote id.
///
/// Writes are idempotent per `(seller, entity type, local id)`: resubmitting
/// a record whose reply was lost updates the same document instead of
/// minting a second remote id.
pub struct DocumentStore {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Creates an empty store whose first minted id uses `first`.
    pub fn with_first_id(first: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(first),
        }
    }

    /// Mints a fresh 24-hex-character remote id.
    fn mint(&self) -> String {
        format!("{:024x}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Creates or updates the document for `item`.
    pub fn upsert(&self, seller: &str, item: &OutboundItem) -> (String, SyncAction) {
        let key = (seller.to_string(), item.entity_type.clone(), item.id.clone());
        let mut inner = self.inner.write();

        let existing = item
            .remote_id
            .clone()
            .filter(|id| inner.documents.contains_key(id))
            .or_else(|| inner.by_local.get(&key).cloned());

        if let Some(remote_id) = existing {
            if let Some(document) = inner.documents.get_mut(&remote_id) {
                document.fields = item.fields.clone();
                document.version += 1;
            }
            inner.by_local.insert(key, remote_id.clone());
            return (remote_id, SyncAction::Updated);
        }

        let remote_id = item.remote_id.clone().unwrap_or_else(|| self.mint());
        inner.documents.insert(
            remote_id.clone(),
            StoredDocument {
                remote_id: remote_id.clone(),
                seller: seller.to_string(),
                entity_type: item.entity_type.clone(),
                local_id: item.id.clone(),
                fields: item.fields.clone(),
                version: 1,
            },
        );
        inner.by_local.insert(key, remote_id.clone());
        (remote_id, SyncAction::Created)
    }

    /// Deletes the document for `item`, returning its remote id if it existed.
    ///
    /// Deleting an unknown document succeeds; the caller's tombstone is
    /// satisfied either way.
    pub fn delete(&self, seller: &str, item: &OutboundItem) -> Option<String> {
        let key = (seller.to_string(), item.entity_type.clone(), item.id.clone());
        let mut inner = self.inner.write();
        let remote_id = item
            .remote_id
            .clone()
            .or_else(|| inner.by_local.get(&key).cloned())?;
        inner.by_local.remove(&key);
        inner.documents.remove(&remote_id).map(|d| d.remote_id)
    }

    /// Returns a document by remote id.
    pub fn get(&self, remote_id: &str) -> Option<StoredDocument> {
        self.inner.read().documents.get(remote_id).cloned()
    }

    /// Returns the document submitted under a local id.
    pub fn find_by_local(&self, seller: &str, entity_type: &str, local_id: &str) -> Option<StoredDocument> {
        let inner = self.inner.read();
        let key = (seller.to_string(), entity_type.to_string(), local_id.to_string());
        inner
            .by_local
            .get(&key)
            .and_then(|id| inner.documents.get(id))
            .cloned()
    }

    /// Returns every document of one entity type.
    pub fn documents_of(&self, entity_type: &str) -> Vec<StoredDocument> {
        let mut documents: Vec<_> = self
            .inner
            .read()
            .documents
            .values()
            .filter(|d| d.entity_type == entity_type)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
        documents
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().documents.is_empty()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
