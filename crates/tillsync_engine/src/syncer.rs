//! Per-group batch submission and reconciliation.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::descriptor::EntityDescriptor;
use crate::error::SyncError;
use crate::grouper::EndpointGroup;
use crate::notify::NotificationBus;
use crate::pending::PendingOperations;
use crate::record::{EntityType, Record};
use crate::remap::IdentityRemapper;
use crate::retry::RetryTracker;
use crate::store::{RecordStore, StoreError};
use crate::summary::{EntitySyncResult, SyncOutcome};
use crate::transport::SyncTransport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tillsync_protocol::{endpoint_path, ItemSuccess, OutboundItem, SyncAction, SyncBatchRequest};
use tracing::{debug, info, trace, warn};

const NO_RESPONSE: &str = "no response from server";
const NO_REMOTE_IDENTITY: &str = "accepted without remote identity";

/// An entity type bound to its local store.
#[derive(Clone)]
pub(crate) struct EntityBinding {
    pub(crate) descriptor: EntityDescriptor,
    pub(crate) store: Arc<dyn RecordStore>,
}

impl EntityBinding {
    pub(crate) fn entity_type(&self) -> &EntityType {
        &self.descriptor.entity_type
    }
}

/// Local ids per entity type.
pub(crate) type RecordIds = HashMap<EntityType, HashSet<String>>;

/// Result of one group.
#[derive(Debug)]
pub(crate) struct GroupOutcome {
    pub(crate) results: Vec<EntitySyncResult>,
    /// Set when the backend reported the plan or session invalid.
    pub(crate) plan_invalid: Option<String>,
    /// Records held back until a dependency syncs.
    pub(crate) deferred: RecordIds,
}

/// A record that went out in the batch.
struct Submitted {
    member: usize,
    fingerprint: String,
}

/// The batch being assembled for one group.
struct Batch<'a> {
    items: &'a mut Vec<OutboundItem>,
    submitted: &'a mut HashMap<String, Submitted>,
    deferred: &'a mut RecordIds,
}

/// What the backend said about one submitted record.
enum Verdict {
    Accepted(ItemSuccess),
    Rejected { error: String, charge: bool },
}

/// Sends one endpoint group and reconciles the reply.
pub(crate) struct StoreSyncer<'a> {
    pub(crate) config: &'a SyncConfig,
    pub(crate) transport: &'a dyn SyncTransport,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) pending: &'a dyn PendingOperations,
    pub(crate) bus: &'a NotificationBus,
}

impl StoreSyncer<'_> {
    /// Syncs every member of `group`.
    ///
    /// `members` must be the bindings of `group.members`, in order. With
    /// `focus` set, only the listed records are considered.
    pub(crate) async fn sync_group(
        &self,
        group: &EndpointGroup,
        members: &[&EntityBinding],
        seller: &str,
        remapper: &IdentityRemapper,
        tracker: &mut RetryTracker,
        focus: Option<&RecordIds>,
    ) -> GroupOutcome {
        let mut results: Vec<EntitySyncResult> = members
            .iter()
            .map(|m| EntitySyncResult::new(m.entity_type().clone(), group.endpoint.clone()))
            .collect();
        let mut items = Vec::new();
        let mut submitted: HashMap<String, Submitted> = HashMap::new();
        let mut deferred = RecordIds::new();

        for (index, member) in members.iter().enumerate() {
            let only = match focus {
                Some(focus) => match focus.get(member.entity_type()) {
                    Some(ids) => Some(ids),
                    None => continue,
                },
                None => None,
            };
            let batch = Batch {
                items: &mut items,
                submitted: &mut submitted,
                deferred: &mut deferred,
            };
            if let Err(e) = self
                .collect(index, member, only, remapper, tracker, &mut results[index], batch)
                .await
            {
                warn!(entity = %member.entity_type(), error = %e, "Aborting entity type, local store failed");
                results[index].error = Some(e.to_string());
            }
        }

        if items.is_empty() {
            trace!(endpoint = %group.endpoint, "Nothing to send");
            return GroupOutcome {
                results,
                plan_invalid: None,
                deferred,
            };
        }

        let path = endpoint_path(&self.config.endpoint_prefix, &group.endpoint);
        let request = SyncBatchRequest::new(seller, items);
        debug!(path = %path, items = request.items.len(), "Submitting batch");

        let reply = tokio::time::timeout(
            self.config.request_timeout,
            self.transport.submit(&path, &request),
        )
        .await
        .unwrap_or(Err(SyncError::Timeout));

        let verdicts: HashMap<String, Verdict> = match reply {
            Ok(response) if response.plan_invalid => {
                let message = response.error.unwrap_or_else(|| "plan invalid".into());
                warn!(path = %path, error = %message, "Backend reported plan or session invalid");
                return GroupOutcome {
                    results,
                    plan_invalid: Some(message),
                    deferred,
                };
            }
            Err(SyncError::PlanInvalid(message)) => {
                warn!(path = %path, error = %message, "Backend reported plan or session invalid");
                return GroupOutcome {
                    results,
                    plan_invalid: Some(message),
                    deferred,
                };
            }
            Ok(response) => {
                let fallback = response.error.clone().unwrap_or_else(|| NO_RESPONSE.into());
                let mut verdicts: HashMap<String, Verdict> = HashMap::new();
                for failure in response.results.failed {
                    verdicts.insert(
                        failure.id,
                        Verdict::Rejected {
                            error: failure.error,
                            charge: true,
                        },
                    );
                }
                for success in response.results.success {
                    verdicts.insert(success.id.clone(), Verdict::Accepted(success));
                }
                for id in submitted.keys() {
                    verdicts.entry(id.clone()).or_insert_with(|| Verdict::Rejected {
                        error: fallback.clone(),
                        charge: true,
                    });
                }
                verdicts
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Batch request failed");
                let charge = self.config.retry.charge_transport_failures;
                submitted
                    .keys()
                    .map(|id| {
                        (
                            id.clone(),
                            Verdict::Rejected {
                                error: e.to_string(),
                                charge,
                            },
                        )
                    })
                    .collect()
            }
        };

        for (index, member) in members.iter().enumerate() {
            let mine: Vec<(&String, &Submitted)> =
                submitted.iter().filter(|(_, s)| s.member == index).collect();
            if mine.is_empty() {
                continue;
            }
            if let Err(e) = self
                .reconcile(member, &mine, &verdicts, tracker, &mut results[index])
                .await
            {
                warn!(entity = %member.entity_type(), error = %e, "Reconciliation aborted, local store failed");
                results[index].error = Some(e.to_string());
            }
        }

        for result in &results {
            info!(
                entity = %result.entity_type,
                synced = result.synced,
                failed = result.failed,
                skipped = result.skipped,
                "Entity type synced"
            );
        }

        GroupOutcome {
            results,
            plan_invalid: None,
            deferred,
        }
    }

    /// Selects, remaps and cleans the records of one member.
    #[allow(clippy::too_many_arguments)]
    async fn collect(
        &self,
        index: usize,
        member: &EntityBinding,
        only: Option<&HashSet<String>>,
        remapper: &IdentityRemapper,
        tracker: &RetryTracker,
        result: &mut EntitySyncResult,
        batch: Batch<'_>,
    ) -> Result<(), StoreError> {
        let descriptor = &member.descriptor;
        let entity = &descriptor.entity_type;
        // Writers register records as they hold them, before any rewrite.
        let mut records = Vec::new();
        for record in member.store.list_all().await? {
            if only.is_some_and(|ids| !ids.contains(&record.id)) {
                continue;
            }
            if record.needs_sync() && self.pending.is_pending(entity, &record.content_hash()) {
                debug!(entity = %entity, id = %record.id, "Write in flight elsewhere");
                continue;
            }
            records.push(record);
        }

        let report = remapper.apply(descriptor, &mut records);
        for id in &report.changed {
            if let Some(record) = records.iter().find(|r| &r.id == id) {
                member.store.update(record).await?;
            }
        }

        for record in records.iter().filter(|r| r.needs_sync()) {
            if report.deferred.contains(&record.id) {
                debug!(entity = %entity, id = %record.id, "Deferred until dependencies sync");
                batch
                    .deferred
                    .entry(entity.clone())
                    .or_default()
                    .insert(record.id.clone());
                result.push(SyncOutcome::success(
                    &record.id,
                    record.remote_id.clone(),
                    SyncAction::Skipped,
                ));
                continue;
            }
            if !tracker.should_retry(entity, record) {
                trace!(entity = %entity, id = %record.id, "Retry budget exhausted");
                continue;
            }
            if batch.submitted.contains_key(&record.id) {
                warn!(entity = %entity, id = %record.id, "Duplicate id in endpoint group");
                result.skipped += 1;
                continue;
            }

            batch.items.push(self.outbound(descriptor, remapper, record));
            batch.submitted.insert(
                record.id.clone(),
                Submitted {
                    member: index,
                    fingerprint: record.content_hash(),
                },
            );
        }

        Ok(())
    }

    fn outbound(
        &self,
        descriptor: &EntityDescriptor,
        remapper: &IdentityRemapper,
        record: &Record,
    ) -> OutboundItem {
        let mut fields = record.fields.clone();
        for path in &descriptor.strip_fields {
            path.remove_where(&mut fields, &|_| true);
        }
        remapper.strip_unresolved(descriptor, &mut fields);

        let mut item = OutboundItem::new(&record.id, descriptor.entity_type.as_str());
        item.remote_id = record.remote_id.clone();
        item.is_deleted = record.is_deleted;
        item.fields = fields;
        item
    }

    /// Applies verdicts to the current state of one member's store.
    async fn reconcile(
        &self,
        member: &EntityBinding,
        submitted: &[(&String, &Submitted)],
        verdicts: &HashMap<String, Verdict>,
        tracker: &mut RetryTracker,
        result: &mut EntitySyncResult,
    ) -> Result<(), StoreError> {
        let entity = member.entity_type();
        let mut current: HashMap<String, Record> = member
            .store
            .list_all()
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        for (id, sent) in submitted {
            let Some(mut record) = current.remove(id.as_str()) else {
                debug!(entity = %entity, id = %id, "Record removed during sync");
                continue;
            };
            let unchanged = record.content_hash() == sent.fingerprint;

            match verdicts.get(id.as_str()) {
                Some(Verdict::Accepted(success))
                    if success.action == SyncAction::Deleted && record.is_deleted =>
                {
                    member.store.delete(&record.id).await?;
                    tracker.clear(entity, &record.id);
                    self.bus.item_synced(entity, &record);
                    result.push(SyncOutcome::success(
                        &record.id,
                        record.remote_id.clone(),
                        SyncAction::Deleted,
                    ));
                }
                Some(Verdict::Accepted(success)) => {
                    let Some(remote_id) = success.remote_id.clone().or_else(|| record.remote_id.clone())
                    else {
                        warn!(entity = %entity, id = %record.id, "Backend accepted record without a remote id");
                        self.fail(member, &mut record, NO_REMOTE_IDENTITY, true, unchanged, tracker)
                            .await?;
                        result.push(SyncOutcome::failure(&record.id, None, NO_REMOTE_IDENTITY));
                        continue;
                    };

                    if unchanged {
                        record.mark_synced(remote_id.clone());
                        member.store.update(&record).await?;
                        tracker.clear(entity, &record.id);
                        self.bus.item_synced(entity, &record);
                        result.push(SyncOutcome::success(&record.id, Some(remote_id), success.action));
                    } else {
                        // Mutated mid-flight; the new content still has to go out.
                        record.remote_id = Some(remote_id.clone());
                        member.store.update(&record).await?;
                        result.push(SyncOutcome::success(&record.id, Some(remote_id), SyncAction::Skipped));
                    }
                }
                Some(Verdict::Rejected { error, charge }) => {
                    self.fail(member, &mut record, error, *charge, unchanged, tracker)
                        .await?;
                    result.push(SyncOutcome::failure(&record.id, record.remote_id.clone(), error.as_str()));
                }
                None => {
                    self.fail(member, &mut record, NO_RESPONSE, true, unchanged, tracker)
                        .await?;
                    result.push(SyncOutcome::failure(&record.id, record.remote_id.clone(), NO_RESPONSE));
                }
            }
        }

        Ok(())
    }

    async fn fail(
        &self,
        member: &EntityBinding,
        record: &mut Record,
        error: &str,
        charge: bool,
        unchanged: bool,
        tracker: &mut RetryTracker,
    ) -> Result<(), StoreError> {
        // A failure of superseded content says nothing about the new content.
        if !unchanged {
            return Ok(());
        }
        let entity = member.entity_type();
        let now = self.clock.now();

        if charge {
            let attempts = tracker.record_failure(entity, record);
            record.record_failure(error, attempts, now);
            if tracker.config().is_exhausted(attempts) {
                warn!(entity = %entity, id = %record.id, attempts, error, "Giving up on record until it changes");
            } else {
                debug!(entity = %entity, id = %record.id, attempts, error, "Record failed, will retry");
            }
        } else {
            record.sync_error = Some(error.to_string());
            record.last_sync_attempt_at = Some(now);
        }

        member.store.update(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{RemoteIdShape, RetryConfig, UnresolvedReferencePolicy};
    use crate::grouper::group_by_endpoint;
    use crate::pending::{NoPendingOperations, PendingRegistry};
    use crate::store::MemoryRecordStore;
    use crate::transport::MockTransport;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use tillsync_protocol::{BatchResults, SyncBatchResponse};

    struct Fixture {
        config: SyncConfig,
        transport: MockTransport,
        clock: ManualClock,
        bus: NotificationBus,
        tracker: RetryTracker,
        remapper: IdentityRemapper,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(SyncConfig::new())
        }

        fn with_config(config: SyncConfig) -> Self {
            Self {
                tracker: RetryTracker::new(config.retry.clone()),
                remapper: IdentityRemapper::new(RemoteIdShape::object_id(), config.unresolved_references),
                config,
                transport: MockTransport::new(),
                clock: ManualClock::new(Utc::now()),
                bus: NotificationBus::new(),
            }
        }

        async fn run(&mut self, bindings: &[EntityBinding], pending: &dyn PendingOperations) -> GroupOutcome {
            self.run_focused(bindings, pending, None).await
        }

        async fn run_focused(
            &mut self,
            bindings: &[EntityBinding],
            pending: &dyn PendingOperations,
            focus: Option<&RecordIds>,
        ) -> GroupOutcome {
            let descriptors: Vec<_> = bindings.iter().map(|b| b.descriptor.clone()).collect();
            let group = group_by_endpoint(&descriptors).remove(0);
            let members: Vec<&EntityBinding> = bindings.iter().collect();
            let syncer = StoreSyncer {
                config: &self.config,
                transport: &self.transport,
                clock: &self.clock,
                pending,
                bus: &self.bus,
            };
            syncer
                .sync_group(&group, &members, "seller-1", &self.remapper, &mut self.tracker, focus)
                .await
        }
    }

    fn binding(entity: &str, endpoint: &str, store: &Arc<MemoryRecordStore>) -> EntityBinding {
        EntityBinding {
            descriptor: EntityDescriptor::new(entity, endpoint),
            store: store.clone(),
        }
    }

    #[tokio::test]
    async fn accepted_record_keeps_local_id() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([
            Record::new("c1").with_field("name", json!("Ada")),
        ]));
        fx.transport.push_response(
            "/sync/customers",
            SyncBatchResponse::accepted(
                BatchResults::default().with_success("c1", Some("C-1".into()), SyncAction::Created),
            ),
        );

        let outcome = fx.run(&[binding("customers", "customers", &store)], &NoPendingOperations).await;

        assert_eq!(outcome.results[0].synced, 1);
        let record = store.get("c1").unwrap();
        assert_eq!(record.id, "c1");
        assert!(record.is_synced);
        assert_eq!(record.remote_id.as_deref(), Some("C-1"));

        let (path, request) = &fx.transport.requests()[0];
        assert_eq!(path, "/sync/customers");
        assert_eq!(request.seller_context, "seller-1");
        assert_eq!(request.items[0].id, "c1");
    }

    #[tokio::test]
    async fn nothing_to_send_makes_no_request() {
        let mut fx = Fixture::new();
        let mut synced = Record::new("c1");
        synced.mark_synced("C-1".into());
        let store = Arc::new(MemoryRecordStore::with_records([synced]));

        fx.run(&[binding("customers", "customers", &store)], &NoPendingOperations).await;
        assert_eq!(fx.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn strips_configured_fields() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("o1")
            .with_field("_id", json!("local_o1"))
            .with_field("total", json!(12))]));
        let mut orders = binding("orders", "orders", &store);
        orders.descriptor = orders.descriptor.strip("_id");

        fx.run(&[orders], &NoPendingOperations).await;

        let (_, request) = &fx.transport.requests()[0];
        assert!(request.items[0].fields.get("_id").is_none());
        assert_eq!(request.items[0].fields["total"], json!(12));
    }

    #[tokio::test]
    async fn missing_outcomes_are_failures() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("p1"), Record::new("p2")]));
        fx.transport.push_response(
            "/sync/products",
            SyncBatchResponse::accepted(
                BatchResults::default().with_success("p1", Some("P-1".into()), SyncAction::Created),
            ),
        );

        let outcome = fx.run(&[binding("products", "products", &store)], &NoPendingOperations).await;

        assert_eq!(outcome.results[0].synced, 1);
        assert_eq!(outcome.results[0].failed, 1);
        let p2 = store.get("p2").unwrap();
        assert!(!p2.is_synced);
        assert_eq!(p2.sync_error.as_deref(), Some(NO_RESPONSE));
        assert_eq!(p2.sync_attempts, 1);
        assert!(p2.last_sync_attempt_at.is_some());
    }

    #[tokio::test]
    async fn acceptance_without_remote_id_is_a_failure() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("p1")]));
        fx.transport.push_response(
            "/sync/products",
            SyncBatchResponse::accepted(
                BatchResults::default().with_success("p1", None, SyncAction::Created),
            ),
        );

        let outcome = fx.run(&[binding("products", "products", &store)], &NoPendingOperations).await;

        assert_eq!(outcome.results[0].failed, 1);
        let record = store.get("p1").unwrap();
        assert!(!record.is_synced);
        assert_eq!(record.sync_error.as_deref(), Some(NO_REMOTE_IDENTITY));
    }

    #[tokio::test]
    async fn tombstone_removed_only_on_deleted_action() {
        let mut fx = Fixture::new();
        let mut gone = Record::new("p1");
        gone.remote_id = Some("P-1".into());
        gone.mark_deleted();
        let mut kept = Record::new("p2");
        kept.remote_id = Some("P-2".into());
        kept.mark_deleted();
        let store = Arc::new(MemoryRecordStore::with_records([gone, kept]));
        fx.transport.push_response(
            "/sync/products",
            SyncBatchResponse::accepted(
                BatchResults::default()
                    .with_success("p1", Some("P-1".into()), SyncAction::Deleted)
                    .with_failure("p2", "locked"),
            ),
        );

        fx.run(&[binding("products", "products", &store)], &NoPendingOperations).await;

        assert!(store.get("p1").is_none());
        let p2 = store.get("p2").unwrap();
        assert!(p2.is_deleted);
        assert_eq!(p2.sync_error.as_deref(), Some("locked"));
    }

    #[tokio::test]
    async fn plan_invalid_touches_nothing() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("o1")]));
        fx.transport
            .push_response("/sync/orders", SyncBatchResponse::plan_invalid("Plan expired"));

        let outcome = fx.run(&[binding("orders", "orders", &store)], &NoPendingOperations).await;

        assert_eq!(outcome.plan_invalid.as_deref(), Some("Plan expired"));
        let record = store.get("o1").unwrap();
        assert_eq!(record.sync_attempts, 0);
        assert!(record.sync_error.is_none());
    }

    #[tokio::test]
    async fn transport_failure_charges_every_item() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("o1"), Record::new("o2")]));
        fx.transport
            .push_error("/sync/orders", SyncError::transport_retryable("connection reset"));

        let outcome = fx.run(&[binding("orders", "orders", &store)], &NoPendingOperations).await;

        assert_eq!(outcome.results[0].failed, 2);
        for id in ["o1", "o2"] {
            let record = store.get(id).unwrap();
            assert_eq!(record.sync_attempts, 1);
            assert_eq!(
                record.sync_error.as_deref(),
                Some("transport error: connection reset")
            );
        }
    }

    #[tokio::test]
    async fn uncharged_transport_failure_keeps_budget() {
        let config = SyncConfig::new()
            .with_retry(RetryConfig::new(3).with_charge_transport_failures(false));
        let mut fx = Fixture::with_config(config);
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("o1")]));
        fx.transport
            .push_error("/sync/orders", SyncError::transport_retryable("connection reset"));

        fx.run(&[binding("orders", "orders", &store)], &NoPendingOperations).await;

        let record = store.get("o1").unwrap();
        assert_eq!(record.sync_attempts, 0);
        assert!(record.sync_error.is_some());
        assert!(record.last_sync_attempt_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let config = SyncConfig::new().with_request_timeout(Duration::from_secs(5));
        let mut fx = Fixture::with_config(config);
        fx.transport.set_delay(Duration::from_secs(60));
        fx.transport.push_response("/sync/orders", SyncBatchResponse::accepted(BatchResults::default()));
        let store = Arc::new(MemoryRecordStore::with_records([Record::new("o1")]));

        let outcome = fx.run(&[binding("orders", "orders", &store)], &NoPendingOperations).await;

        assert_eq!(outcome.results[0].failed, 1);
        assert_eq!(
            store.get("o1").unwrap().sync_error.as_deref(),
            Some("operation timed out")
        );
    }

    #[tokio::test]
    async fn exhausted_and_pending_records_are_not_sent() {
        let mut fx = Fixture::new();
        let mut exhausted = Record::new("o1");
        exhausted.record_failure("rejected", 3, Utc::now());
        let in_flight = Record::new("o2").with_field("total", json!(9));
        let store = Arc::new(MemoryRecordStore::with_records([exhausted, in_flight.clone()]));
        let registry = PendingRegistry::new();
        let _guard = registry.begin(&"orders".into(), &in_flight);

        fx.run(&[binding("orders", "orders", &store)], &registry).await;

        assert_eq!(fx.transport.request_count(), 0);
        assert_eq!(store.get("o1").unwrap().sync_attempts, 3);
    }

    #[tokio::test]
    async fn pending_record_with_remappable_key_is_left_alone() {
        let mut fx = Fixture::new();
        let mut customer = Record::new("c1");
        customer.mark_synced("C-1".into());
        fx.remapper.build_mapping(&"customers".into(), &[customer]);

        let order = Record::new("o1").with_field("customerId", json!("c1"));
        let store = Arc::new(MemoryRecordStore::with_records([order.clone()]));
        let mut orders = binding("orders", "orders", &store);
        orders.descriptor = orders.descriptor.foreign_key("customerId", "customers");
        let registry = PendingRegistry::new();
        let guard = registry.begin(&"orders".into(), &order);

        fx.run(&[orders.clone()], &registry).await;

        assert_eq!(fx.transport.request_count(), 0);
        assert_eq!(store.get("o1").unwrap(), order);

        drop(guard);
        fx.transport.push_response(
            "/sync/orders",
            SyncBatchResponse::accepted(
                BatchResults::default().with_success("o1", Some("O-1".into()), SyncAction::Created),
            ),
        );
        let outcome = fx.run(&[orders], &registry).await;

        assert_eq!(outcome.results[0].synced, 1);
        let (_, request) = &fx.transport.requests()[0];
        assert_eq!(request.items[0].fields["customerId"], json!("C-1"));
        assert_eq!(store.get("o1").unwrap().field_str("customerId"), Some("C-1"));
    }

    #[tokio::test]
    async fn acceptance_of_superseded_content_is_not_counted_as_synced() {
        let mut fx = Fixture::new();
        let store = Arc::new(MemoryRecordStore::with_records([
            Record::new("c1").with_field("name", json!("Ada")),
        ]));
        let writer = store.clone();
        fx.transport.set_responder(move |_, request| {
            writer.modify("c1", |record| record.set_field("name", json!("Ada L.")));
            let results = request.items.iter().fold(BatchResults::default(), |acc, item| {
                acc.with_success(&item.id, Some("C-1".into()), SyncAction::Created)
            });
            Ok(SyncBatchResponse::accepted(results))
        });

        let outcome = fx.run(&[binding("customers", "customers", &store)], &NoPendingOperations).await;

        let result = &outcome.results[0];
        assert_eq!(result.synced, 0);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.outcomes[0].action, SyncAction::Skipped);
        let record = store.get("c1").unwrap();
        assert!(!record.is_synced);
        assert_eq!(record.remote_id.as_deref(), Some("C-1"));
        assert_eq!(record.field_str("name"), Some("Ada L."));
    }

    #[tokio::test]
    async fn shared_endpoint_sends_one_batch() {
        let mut fx = Fixture::new();
        let transactions = Arc::new(MemoryRecordStore::with_records([Record::new("t1")]));
        let refunds = Arc::new(MemoryRecordStore::with_records([Record::new("r1"), Record::new("t1")]));
        fx.transport.push_response(
            "/sync/transactions",
            SyncBatchResponse::accepted(
                BatchResults::default()
                    .with_success("t1", Some("T-1".into()), SyncAction::Created)
                    .with_success("r1", Some("R-1".into()), SyncAction::Created),
            ),
        );

        let outcome = fx
            .run(
                &[
                    binding("transactions", "transactions", &transactions),
                    binding("refunds", "transactions", &refunds),
                ],
                &NoPendingOperations,
            )
            .await;

        assert_eq!(fx.transport.request_count(), 1);
        let (_, request) = &fx.transport.requests()[0];
        assert_eq!(request.items.len(), 2);
        assert_eq!(outcome.results[0].synced, 1);
        assert_eq!(outcome.results[1].synced, 1);
        // Duplicate id in the second member is held back.
        assert_eq!(outcome.results[1].skipped, 1);
        assert!(!refunds.get("t1").unwrap().is_synced);
    }

    #[tokio::test]
    async fn list_failure_aborts_only_that_type() {
        let mut fx = Fixture::new();
        let batches = Arc::new(MemoryRecordStore::with_records([Record::new("b1")]));
        let adjustments = Arc::new(MemoryRecordStore::with_records([Record::new("a1")]));
        adjustments.set_fail_list(true);
        fx.transport.push_response(
            "/sync/inventory",
            SyncBatchResponse::accepted(
                BatchResults::default().with_success("b1", Some("B-1".into()), SyncAction::Created),
            ),
        );

        let outcome = fx
            .run(
                &[
                    binding("batches", "inventory", &batches),
                    binding("adjustments", "inventory", &adjustments),
                ],
                &NoPendingOperations,
            )
            .await;

        assert_eq!(outcome.results[0].synced, 1);
        assert!(outcome.results[1].error.is_some());
        assert!(batches.get("b1").unwrap().is_synced);
    }

    #[tokio::test]
    async fn focus_limits_the_batch_to_listed_records() {
        let mut fx = Fixture::new();
        let transactions = Arc::new(MemoryRecordStore::with_records([Record::new("t2")]));
        let refunds = Arc::new(MemoryRecordStore::with_records([Record::new("r1"), Record::new("r2")]));
        fx.transport.push_response(
            "/sync/transactions",
            SyncBatchResponse::accepted(
                BatchResults::default().with_success("r1", Some("R-1".into()), SyncAction::Created),
            ),
        );
        let focus = RecordIds::from([("refunds".into(), HashSet::from(["r1".to_string()]))]);

        let outcome = fx
            .run_focused(
                &[
                    binding("transactions", "transactions", &transactions),
                    binding("refunds", "transactions", &refunds),
                ],
                &NoPendingOperations,
                Some(&focus),
            )
            .await;

        let (_, request) = &fx.transport.requests()[0];
        let ids: Vec<&str> = request.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["r1"]);
        assert_eq!(outcome.results[1].synced, 1);
        assert!(!refunds.get("r2").unwrap().is_synced);
        assert!(!transactions.get("t2").unwrap().is_synced);
    }

    #[tokio::test]
    async fn deferred_records_are_skipped() {
        let mut fx = Fixture::new();
        fx.remapper.build_mapping(&"customers".into(), &[Record::new("c1")]);
        let store = Arc::new(MemoryRecordStore::with_records([
            Record::new("o1").with_field("customerId", json!("c1")),
        ]));
        let mut orders = binding("orders", "orders", &store);
        orders.descriptor = orders.descriptor.foreign_key("customerId", "customers");

        let outcome = fx.run(&[orders], &NoPendingOperations).await;

        assert_eq!(fx.transport.request_count(), 0);
        assert_eq!(outcome.results[0].skipped, 1);
        assert!(outcome.deferred[&EntityType::from("orders")].contains("o1"));
        assert_eq!(store.get("o1").unwrap().sync_attempts, 0);
    }
}
