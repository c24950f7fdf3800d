//! # Tillsync Engine
//!
//! Background synchronization of an offline-first point-of-sale dataset.
//!
//! This crate provides:
//! - Record model with sync-control fields and content hashing
//! - Per-entity descriptors (endpoint, stripped fields, foreign keys)
//! - Identity remapping of local placeholders to backend identities
//! - Endpoint grouping and per-group batch reconciliation
//! - Bounded per-record retries
//! - Single-flight sweeps in a fixed dependency order
//! - A debounced scheduler and a notification bus
//! - Transport abstractions (HTTP, loopback, mock)
//!
//! ## Architecture
//!
//! A local write calls [`DebouncedScheduler::schedule`]. Once the quiet
//! period elapses and the device is online, [`SyncEngine::run_all`] walks
//! the endpoint groups in declared order. For every group the engine
//! remaps foreign keys, submits one batch, reconciles the reply by local id
//! and notifies observers.
//!
//! ## Key Invariants
//!
//! - A record's local `id` never changes; the backend identity goes to `remote_id`
//! - At most one sweep runs at a time; concurrent callers share its summary
//! - Tombstones are removed only after the backend confirms the deletion
//! - A record is retried automatically at most `max_attempts` times per content

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod descriptor;
mod engine;
mod error;
mod grouper;
mod http;
mod notify;
mod pending;
mod record;
mod remap;
pub mod retail;
mod retry;
mod scheduler;
mod session;
mod store;
mod summary;
mod syncer;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RemoteIdShape, RetryConfig, SyncConfig, UnresolvedReferencePolicy};
pub use descriptor::{EntityDescriptor, FieldPath, ForeignKey};
pub use engine::{SyncEngine, SyncEngineBuilder, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use grouper::{group_by_endpoint, validate_order, EndpointGroup};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use notify::{ChannelObserver, NotificationBus, SyncEvent, SyncObserver};
pub use pending::{NoPendingOperations, PendingGuard, PendingOperations, PendingRegistry};
pub use record::{EntityType, Record, LOCAL_ID_PREFIX};
pub use remap::{IdMapping, IdentityRemapper, RemapReport};
pub use retry::RetryTracker;
pub use scheduler::{DebouncedScheduler, SweepTrigger};
pub use session::{SessionContext, SessionProvider, StaticSession};
pub use store::{MemoryRecordStore, RecordStore, StoreError, StoreResult};
pub use summary::{EntitySyncResult, SweepHalt, SweepSummary, SyncOutcome};
pub use transport::{MockTransport, SyncTransport};
