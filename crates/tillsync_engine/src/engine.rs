//! Sweep orchestration.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::descriptor::EntityDescriptor;
use crate::error::{SyncError, SyncResult};
use crate::grouper::{group_by_endpoint, validate_order, EndpointGroup};
use crate::notify::{NotificationBus, SyncObserver};
use crate::pending::{NoPendingOperations, PendingOperations};
use crate::record::EntityType;
use crate::remap::IdentityRemapper;
use crate::retry::RetryTracker;
use crate::scheduler::{DebouncedScheduler, SweepTrigger};
use crate::session::{SessionContext, SessionProvider};
use crate::store::RecordStore;
use crate::summary::{EntitySyncResult, SweepHalt, SweepSummary};
use crate::syncer::{EntityBinding, RecordIds, StoreSyncer};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sweep is running.
    Idle,
    /// A sweep is running.
    Syncing,
}

impl SyncState {
    /// Returns true if a sweep is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

/// Statistics about sweeps.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sweeps completed, halted ones included.
    pub sweeps_completed: u64,
    /// Records accepted across all sweeps.
    pub records_synced: u64,
    /// Records failed across all sweeps.
    pub records_failed: u64,
    /// When the last sweep started.
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Why the last sweep halted, if it did.
    pub last_halt: Option<SweepHalt>,
}

type SharedSweep = Shared<BoxFuture<'static, Arc<SweepSummary>>>;

/// Upper bound on passes over one endpoint group within a sweep.
const MAX_GROUP_PASSES: usize = 8;

/// State mutated only by the running sweep.
struct SweepState {
    tracker: RetryTracker,
    remapper: IdentityRemapper,
}

struct EngineInner {
    config: SyncConfig,
    bindings: Vec<EntityBinding>,
    groups: Vec<EndpointGroup>,
    sources: HashSet<EntityType>,
    transport: Arc<dyn SyncTransport>,
    session: SessionContext,
    clock: Arc<dyn Clock>,
    pending: Arc<dyn PendingOperations>,
    bus: NotificationBus,
    sweep_state: tokio::sync::Mutex<SweepState>,
    in_flight: Mutex<Option<SharedSweep>>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

/// The sync engine.
///
/// Cheap to clone; clones share the same stores, retry state and in-flight
/// sweep.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Starts building an engine.
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.inner.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Returns the endpoint groups in sync order.
    pub fn groups(&self) -> &[EndpointGroup] {
        &self.inner.groups
    }

    /// Returns the registered entity types in declaration order.
    pub fn entity_types(&self) -> Vec<EntityType> {
        self.inner
            .bindings
            .iter()
            .map(|b| b.entity_type().clone())
            .collect()
    }

    /// Returns the store of an entity type.
    pub fn store(&self, entity: &str) -> Option<Arc<dyn RecordStore>> {
        self.inner
            .bindings
            .iter()
            .find(|b| b.entity_type().as_str() == entity)
            .map(|b| b.store.clone())
    }

    /// Returns the notification bus.
    pub fn notifications(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// Returns true if the transport reports connectivity.
    pub fn is_online(&self) -> bool {
        self.inner.transport.is_online()
    }

    /// Creates a debounced scheduler for this engine.
    pub fn scheduler(&self) -> DebouncedScheduler {
        DebouncedScheduler::new(Arc::new(self.clone()), self.inner.config.quiet_period)
    }

    /// Runs one full sweep across every entity type.
    ///
    /// If a sweep is already running, the caller joins it and receives the
    /// same summary instead of starting a second one. The sweep runs on its
    /// own task and completes even if every caller stops waiting.
    pub async fn run_all(&self) -> Arc<SweepSummary> {
        let sweep = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(running) => {
                    debug!("Joining in-flight sweep");
                    running.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let handle = tokio::spawn(async move {
                        let _clear = ClearInFlight(inner.clone());
                        Arc::new(inner.sweep().await)
                    });
                    let started_at = self.inner.clock.now();
                    let shared = async move {
                        match handle.await {
                            Ok(summary) => summary,
                            Err(e) => {
                                warn!(error = %e, "Sweep task ended abnormally");
                                Arc::new(SweepSummary::halted(
                                    SweepHalt::Aborted(e.to_string()),
                                    started_at,
                                ))
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };
        sweep.await
    }
}

/// Frees the single-flight slot when the sweep task ends, panics included.
struct ClearInFlight(Arc<EngineInner>);

impl Drop for ClearInFlight {
    fn drop(&mut self) {
        *self.0.in_flight.lock() = None;
    }
}

#[async_trait]
impl SweepTrigger for SyncEngine {
    fn is_online(&self) -> bool {
        SyncEngine::is_online(self)
    }

    async fn trigger(&self) {
        self.run_all().await;
    }
}

impl EngineInner {
    async fn sweep(&self) -> SweepSummary {
        *self.state.write() = SyncState::Syncing;
        let summary = self.sweep_groups().await;
        *self.state.write() = SyncState::Idle;

        {
            let mut stats = self.stats.write();
            stats.sweeps_completed += 1;
            stats.records_synced += summary.total_synced as u64;
            stats.records_failed += summary.total_failed as u64;
            stats.last_sweep_at = Some(summary.started_at);
            stats.last_halt = summary.halt.clone();
        }

        match &summary.halt {
            Some(halt) => info!(halt = %halt, "Sweep halted"),
            None => info!(
                synced = summary.total_synced,
                failed = summary.total_failed,
                skipped = summary.total_skipped,
                elapsed_ms = summary.duration.as_millis() as u64,
                "Sweep finished"
            ),
        }
        self.bus.sweep_completed(&summary);
        summary
    }

    async fn sweep_groups(&self) -> SweepSummary {
        let started_at = self.clock.now();
        let start = Instant::now();

        if !self.transport.is_online() {
            info!("Offline, skipping sweep");
            return SweepSummary::halted(SweepHalt::Offline, started_at);
        }
        let seller = match self.session.resolve().await {
            Ok(seller) => seller,
            Err(e) => {
                warn!(error = %e, "No seller context, skipping sweep");
                return SweepSummary::halted(SweepHalt::MissingSession, started_at);
            }
        };

        info!(groups = self.groups.len(), "Sweep started");

        let mut guard = self.sweep_state.lock().await;
        let SweepState { tracker, remapper } = &mut *guard;
        remapper.clear();

        let syncer = StoreSyncer {
            config: &self.config,
            transport: self.transport.as_ref(),
            clock: self.clock.as_ref(),
            pending: self.pending.as_ref(),
            bus: &self.bus,
        };

        let mut per_entity = Vec::new();
        let mut halt = None;

        'groups: for group in &self.groups {
            let mut results: Vec<EntitySyncResult> = Vec::new();
            let mut focus: Option<RecordIds> = None;

            for pass in 1..=MAX_GROUP_PASSES {
                let mut members = Vec::new();
                for binding in self.members(group) {
                    match self.load_mappings(binding, remapper).await {
                        Ok(()) => members.push(binding),
                        Err(e) => {
                            warn!(entity = %binding.entity_type(), error = %e, "Could not load identity mappings");
                            if focus.is_none() {
                                let mut result =
                                    EntitySyncResult::new(binding.entity_type().clone(), group.endpoint.clone());
                                result.error = Some(e.to_string());
                                results.push(result);
                            }
                        }
                    }
                }
                if members.is_empty() {
                    break;
                }

                let outcome = syncer
                    .sync_group(group, &members, &seller, remapper, tracker, focus.as_ref())
                    .await;
                let progressed = outcome
                    .results
                    .iter()
                    .any(|r| r.synced > 0 && self.sources.contains(&r.entity_type));
                merge_results(&mut results, outcome.results);

                if let Some(message) = outcome.plan_invalid {
                    halt = Some(SweepHalt::PlanInvalid(message));
                    per_entity.extend(results);
                    break 'groups;
                }

                for member in &members {
                    if self.sources.contains(member.entity_type()) {
                        remapper.invalidate(member.entity_type());
                    }
                }

                // Dependents of records accepted in this pass go out in the same sweep.
                if outcome.deferred.is_empty() || !progressed {
                    break;
                }
                debug!(endpoint = %group.endpoint, pass, "Resending records held back for their dependencies");
                focus = Some(outcome.deferred);
            }

            per_entity.extend(results);
        }

        SweepSummary::from_results(per_entity, halt, started_at, start.elapsed())
    }

    fn members<'a>(&'a self, group: &'a EndpointGroup) -> impl Iterator<Item = &'a EntityBinding> + 'a {
        group
            .members
            .iter()
            .filter_map(|entity| self.bindings.iter().find(|b| b.entity_type() == entity))
    }

    /// Builds the mappings `binding` needs that are not cached yet.
    async fn load_mappings(&self, binding: &EntityBinding, remapper: &mut IdentityRemapper) -> SyncResult<()> {
        for fk in &binding.descriptor.foreign_keys {
            if remapper.has_mapping(&fk.target) {
                continue;
            }
            let Some(source) = self.bindings.iter().find(|b| b.entity_type() == &fk.target) else {
                continue;
            };
            let records = source
                .store
                .list_all()
                .await
                .map_err(|e| SyncError::store(fk.target.as_str(), e.to_string()))?;
            remapper.build_mapping(&fk.target, &records);
        }
        Ok(())
    }
}

/// Adds the results of one pass to those of earlier passes over the same group.
fn merge_results(results: &mut Vec<EntitySyncResult>, pass: Vec<EntitySyncResult>) {
    for result in pass {
        match results.iter_mut().find(|r| r.entity_type == result.entity_type) {
            Some(earlier) => earlier.absorb(result),
            None => results.push(result),
        }
    }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    transport: Option<Arc<dyn SyncTransport>>,
    session: Option<Arc<dyn SessionProvider>>,
    clock: Arc<dyn Clock>,
    pending: Arc<dyn PendingOperations>,
    bus: NotificationBus,
    bindings: Vec<EntityBinding>,
}

impl SyncEngineBuilder {
    /// Creates a builder.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            transport: None,
            session: None,
            clock: Arc::new(SystemClock),
            pending: Arc::new(NoPendingOperations),
            bus: NotificationBus::new(),
            bindings: Vec::new(),
        }
    }

    /// Sets the transport.
    pub fn transport(mut self, transport: Arc<dyn SyncTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the session provider.
    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the pending-operation predicate.
    pub fn pending_operations(mut self, pending: Arc<dyn PendingOperations>) -> Self {
        self.pending = pending;
        self
    }

    /// Registers an observer.
    pub fn observer(self, observer: Arc<dyn SyncObserver>) -> Self {
        self.bus.subscribe(observer);
        self
    }

    /// Registers an entity type. Registration order is sync order.
    pub fn entity(mut self, descriptor: EntityDescriptor, store: Arc<dyn RecordStore>) -> Self {
        self.bindings.push(EntityBinding { descriptor, store });
        self
    }

    /// Validates the setup and builds the engine.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let transport = self
            .transport
            .ok_or_else(|| SyncError::Configuration("no transport set".into()))?;
        let session = self
            .session
            .ok_or_else(|| SyncError::Configuration("no session provider set".into()))?;

        let descriptors: Vec<EntityDescriptor> =
            self.bindings.iter().map(|b| b.descriptor.clone()).collect();
        let groups = group_by_endpoint(&descriptors);
        validate_order(&descriptors, &groups)?;
        let sources = descriptors
            .iter()
            .flat_map(|d| d.foreign_keys.iter().map(|fk| fk.target.clone()))
            .collect();

        let sweep_state = SweepState {
            tracker: RetryTracker::new(self.config.retry.clone()),
            remapper: IdentityRemapper::new(
                self.config.remote_id_shape.clone(),
                self.config.unresolved_references,
            ),
        };

        Ok(SyncEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                bindings: self.bindings,
                groups,
                sources,
                transport,
                session: SessionContext::new(session),
                clock: self.clock,
                pending: self.pending,
                bus: self.bus,
                sweep_state: tokio::sync::Mutex::new(sweep_state),
                in_flight: Mutex::new(None),
                state: RwLock::new(SyncState::Idle),
                stats: RwLock::new(SyncStats::default()),
            }),
        })
    }
}
