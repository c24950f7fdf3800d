//! Cross-crate integration test helpers.
//!
//! Wires a [`SyncEngine`] over the retail catalogue to an in-process
//! [`SyncServer`] through the real JSON/HTTP transport path.

use crate::fixtures::ServerHandle;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tillsync_engine::{
    retail, EntitySyncResult, HttpTransport, LoopbackClient, MemoryRecordStore, Record,
    StaticSession, SweepSummary, SyncConfig, SyncEngine, SyncError, SyncResult, SyncTransport,
};
use tillsync_protocol::{SyncBatchRequest, SyncBatchResponse};
use tillsync_server::{ServerConfig, SyncServer};

/// Base URL the harness transport posts to.
pub const HARNESS_BASE_URL: &str = "http://backend.test";

/// Default seller of the harness.
pub const HARNESS_SELLER: &str = "seller-1";

/// Transport with a connectivity switch in front of the loopback path.
pub struct SwitchableTransport {
    inner: HttpTransport<LoopbackClient<ServerHandle>>,
    online: AtomicBool,
}

impl SwitchableTransport {
    /// Creates an online transport to `server`.
    pub fn new(server: Arc<SyncServer>) -> Self {
        Self {
            inner: HttpTransport::new(HARNESS_BASE_URL, LoopbackClient::new(ServerHandle(server))),
            online: AtomicBool::new(true),
        }
    }

    /// Flips connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncTransport for SwitchableTransport {
    async fn submit(&self, path: &str, request: &SyncBatchRequest) -> SyncResult<SyncBatchResponse> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        self.inner.submit(path, request).await
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst) && self.inner.is_online()
    }
}

/// A test harness for integration testing.
///
/// One in-memory store per retail entity type, an engine over all of them,
/// and the backend they sync to.
pub struct SyncHarness {
    /// The engine under test.
    pub engine: SyncEngine,
    /// The backend.
    pub server: Arc<SyncServer>,
    /// The transport, for connectivity changes.
    pub transport: Arc<SwitchableTransport>,
    stores: BTreeMap<String, Arc<MemoryRecordStore>>,
}

impl SyncHarness {
    /// Creates a harness with default engine and server settings.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Creates a harness with a custom engine configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::build(config, ServerConfig::default(), HARNESS_SELLER)
    }

    /// Creates a harness with full control over both sides.
    pub fn build(config: SyncConfig, server_config: ServerConfig, seller: &str) -> Self {
        let server = Arc::new(SyncServer::new(server_config));
        let transport = Arc::new(SwitchableTransport::new(Arc::clone(&server)));

        let mut builder = SyncEngine::builder(config)
            .transport(Arc::clone(&transport) as Arc<dyn SyncTransport>)
            .session(Arc::new(StaticSession::new(seller)));
        let mut stores = BTreeMap::new();
        for descriptor in retail::catalogue() {
            let store = Arc::new(MemoryRecordStore::new());
            stores.insert(descriptor.entity_type.as_str().to_string(), Arc::clone(&store));
            builder = builder.entity(descriptor, store);
        }

        Self {
            engine: builder.build().expect("Failed to build engine"),
            server,
            transport,
            stores,
        }
    }

    /// Returns the store of an entity type.
    pub fn store(&self, entity: &str) -> &Arc<MemoryRecordStore> {
        self.stores
            .get(entity)
            .unwrap_or_else(|| panic!("No store for {}", entity))
    }

    /// Writes a record locally.
    pub fn insert(&self, entity: &str, record: Record) {
        self.store(entity).insert(record);
    }

    /// Reads a record locally.
    pub fn get(&self, entity: &str, id: &str) -> Option<Record> {
        self.store(entity).get(id)
    }

    /// Applies a local mutation, making the record pending again.
    pub fn edit<F: FnOnce(&mut Record)>(&self, entity: &str, id: &str, f: F) {
        let found = self.store(entity).modify(id, |record| {
            f(record);
            record.touch();
        });
        assert!(found, "No record {} in {}", id, entity);
    }

    /// Runs one sweep.
    pub async fn sweep(&self) -> Arc<SweepSummary> {
        self.engine.run_all().await
    }

    /// Returns the result of `entity` in a summary, panicking if absent.
    pub fn result<'a>(summary: &'a SweepSummary, entity: &str) -> &'a EntitySyncResult {
        summary
            .result_for(entity)
            .unwrap_or_else(|| panic!("No result for {}", entity))
    }

    /// Returns the unsynced records of one entity type.
    pub fn unsynced(&self, entity: &str) -> Vec<Record> {
        self.store(entity)
            .snapshot()
            .into_iter()
            .filter(Record::needs_sync)
            .collect()
    }

    /// Returns the number of unsynced records across all types.
    pub fn unsynced_total(&self) -> usize {
        self.stores
            .keys()
            .map(|entity| self.unsynced(entity).len())
            .sum()
    }

    /// Asserts that a synced record is stored on the backend under its remote id.
    pub fn verify_remote(&self, entity: &str, id: &str) -> String {
        let record = self
            .get(entity, id)
            .unwrap_or_else(|| panic!("No record {} in {}", id, entity));
        assert!(record.is_synced, "{} is not synced", id);
        let remote_id = record.remote_id.clone().expect("Synced record without remote id");
        let document = self
            .server
            .documents()
            .get(&remote_id)
            .unwrap_or_else(|| panic!("Backend has no document {}", remote_id));
        assert_eq!(document.local_id, id, "Local id mismatch for {}", remote_id);
        remote_id
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}
