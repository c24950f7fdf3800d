//! Local-to-remote identity remapping.

use crate::config::{RemoteIdShape, UnresolvedReferencePolicy};
use crate::descriptor::EntityDescriptor;
use crate::record::{EntityType, Record};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Mapping of one entity type's local identities to backend identities.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    local_to_remote: HashMap<String, String>,
    remote_ids: HashSet<String>,
    local_ids: HashSet<String>,
}

impl IdMapping {
    /// Builds a mapping from every record that carries a remote id.
    ///
    /// Records without one are remembered as known local identities so
    /// that references to them can be told apart from dangling ones.
    pub fn from_records(records: &[Record]) -> Self {
        let mut mapping = Self::default();
        for record in records {
            mapping.local_ids.insert(record.id.clone());
            if let Some(remote) = &record.remote_id {
                mapping
                    .local_to_remote
                    .insert(record.id.clone(), remote.clone());
                mapping.remote_ids.insert(remote.clone());
            }
        }
        mapping
    }

    /// Returns the remote id for a local id.
    pub fn resolve(&self, local_id: &str) -> Option<&str> {
        self.local_to_remote.get(local_id).map(String::as_str)
    }

    /// Returns true if `value` is a remote id of this type.
    pub fn is_remote(&self, value: &str) -> bool {
        self.remote_ids.contains(value)
    }

    /// Returns true if a record with local id `id` exists.
    pub fn contains_local(&self, id: &str) -> bool {
        self.local_ids.contains(id)
    }

    /// Returns the number of mapped identities.
    pub fn len(&self) -> usize {
        self.local_to_remote.len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.local_to_remote.is_empty()
    }
}

/// How a single reference value relates to the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    Resolved,
    Mapped(String),
    Pending,
    Dangling,
}

/// What [`IdentityRemapper::apply`] did to a batch of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    /// References rewritten to a remote id.
    pub rewritten: usize,
    /// References nulled.
    pub nulled: usize,
    /// Records whose payload changed and must be persisted.
    pub changed: Vec<String>,
    /// Records held back because a dependency has not synced yet.
    pub deferred: HashSet<String>,
}

impl RemapReport {
    /// Returns true if nothing was touched.
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.deferred.is_empty()
    }
}

/// Keeps one [`IdMapping`] per dependency-source type and rewrites foreign
/// keys of dependent records.
///
/// Mappings are cached for the duration of a sweep and rebuilt after every
/// group that contains a source type.
#[derive(Debug)]
pub struct IdentityRemapper {
    shape: RemoteIdShape,
    policy: UnresolvedReferencePolicy,
    mappings: HashMap<EntityType, IdMapping>,
}

impl IdentityRemapper {
    /// Creates a remapper with no mappings.
    pub fn new(shape: RemoteIdShape, policy: UnresolvedReferencePolicy) -> Self {
        Self {
            shape,
            policy,
            mappings: HashMap::new(),
        }
    }

    /// Drops every cached mapping.
    pub fn clear(&mut self) {
        self.mappings.clear();
    }

    /// Drops the mapping of `entity` so it is rebuilt on next use.
    pub fn invalidate(&mut self, entity: &EntityType) {
        self.mappings.remove(entity);
    }

    /// Returns true if a mapping for `entity` is cached.
    pub fn has_mapping(&self, entity: &EntityType) -> bool {
        self.mappings.contains_key(entity)
    }

    /// Returns the cached mapping for `entity`.
    pub fn mapping(&self, entity: &EntityType) -> Option<&IdMapping> {
        self.mappings.get(entity)
    }

    /// Builds (or rebuilds) the mapping of `entity` from its records.
    pub fn build_mapping(&mut self, entity: &EntityType, records: &[Record]) -> &IdMapping {
        let mapping = IdMapping::from_records(records);
        trace!(entity = %entity, mapped = mapping.len(), "Built identity mapping");
        self.mappings.insert(entity.clone(), mapping);
        &self.mappings[entity]
    }

    /// Returns true if `value` is usable as a reference to `target` on the wire.
    pub fn is_resolved(&self, target: &EntityType, value: &str) -> bool {
        self.shape.matches(value) || self.mappings.get(target).is_some_and(|m| m.is_remote(value))
    }

    fn classify(&self, target: &EntityType, value: &str) -> Reference {
        if self.is_resolved(target, value) {
            return Reference::Resolved;
        }
        match self.mappings.get(target) {
            Some(mapping) => match mapping.resolve(value) {
                Some(remote) => Reference::Mapped(remote.to_string()),
                None if mapping.contains_local(value) => Reference::Pending,
                None => Reference::Dangling,
            },
            None => Reference::Dangling,
        }
    }

    /// Rewrites foreign keys of the unsynced records in `records`.
    ///
    /// Resolved references are left alone and mapped ones are rewritten to
    /// the remote id. An unresolved reference is nulled, unless the policy is
    /// [`UnresolvedReferencePolicy::Defer`] and its target still exists
    /// locally, in which case the whole record is deferred untouched.
    pub fn apply(&self, descriptor: &EntityDescriptor, records: &mut [Record]) -> RemapReport {
        let mut report = RemapReport::default();
        if descriptor.foreign_keys.is_empty() {
            return report;
        }

        for record in records.iter_mut().filter(|r| r.needs_sync()) {
            if self.policy == UnresolvedReferencePolicy::Defer && self.has_pending(descriptor, record) {
                report.deferred.insert(record.id.clone());
                continue;
            }

            let mut rewritten = 0;
            let mut nulled = 0;
            for fk in &descriptor.foreign_keys {
                fk.path.visit_mut(&mut record.fields, &mut |value| {
                    let Some(current) = value.as_str() else {
                        return;
                    };
                    match self.classify(&fk.target, current) {
                        Reference::Resolved => {}
                        Reference::Mapped(remote) => {
                            *value = Value::String(remote);
                            rewritten += 1;
                        }
                        Reference::Pending | Reference::Dangling => {
                            *value = Value::Null;
                            nulled += 1;
                        }
                    }
                });
            }

            if rewritten + nulled > 0 {
                debug!(
                    entity = %descriptor.entity_type,
                    id = %record.id,
                    rewritten,
                    nulled,
                    "Remapped foreign keys"
                );
                report.rewritten += rewritten;
                report.nulled += nulled;
                report.changed.push(record.id.clone());
            }
        }

        report
    }

    fn has_pending(&self, descriptor: &EntityDescriptor, record: &Record) -> bool {
        let mut pending = false;
        for fk in &descriptor.foreign_keys {
            fk.path.visit(&record.fields, &mut |value| {
                if let Some(current) = value.as_str() {
                    pending |= self.classify(&fk.target, current) == Reference::Pending;
                }
            });
        }
        pending
    }

    /// Removes foreign-key values that are not valid backend references.
    ///
    /// Explicit nulls are kept so the backend sees the cleared relationship.
    pub fn strip_unresolved(&self, descriptor: &EntityDescriptor, fields: &mut Map<String, Value>) -> usize {
        descriptor
            .foreign_keys
            .iter()
            .map(|fk| {
                fk.path.remove_where(fields, &|value| match value {
                    Value::String(s) => !self.is_resolved(&fk.target, s),
                    Value::Null => false,
                    _ => true,
                })
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REMOTE_P: &str = "65f1c2a9b3e4d5f6a7b8c9d0";

    fn orders() -> EntityDescriptor {
        EntityDescriptor::new("orders", "orders")
            .foreign_key("customerId", "customers")
            .foreign_key("items[].productId", "products")
    }

    fn synced(id: &str, remote: &str) -> Record {
        let mut record = Record::new(id);
        record.mark_synced(remote.into());
        record
    }

    fn remapper(policy: UnresolvedReferencePolicy) -> IdentityRemapper {
        let mut remapper = IdentityRemapper::new(RemoteIdShape::object_id(), policy);
        remapper.build_mapping(
            &"products".into(),
            &[synced("p1", "P-99"), Record::new("p2")],
        );
        remapper.build_mapping(&"customers".into(), &[synced("c1", "C-1")]);
        remapper
    }

    #[test]
    fn mapping_includes_only_records_with_remote_ids() {
        let mapping = IdMapping::from_records(&[synced("p1", "P-99"), Record::new("p2")]);
        assert_eq!(mapping.resolve("p1"), Some("P-99"));
        assert_eq!(mapping.resolve("p2"), None);
        assert!(mapping.contains_local("p2"));
        assert!(mapping.is_remote("P-99"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn rewrites_mapped_references() {
        let remapper = remapper(UnresolvedReferencePolicy::Defer);
        let mut records = vec![Record::new("o1")
            .with_field("customerId", json!("c1"))
            .with_field("items", json!([{"productId": "p1"}, {"productId": REMOTE_P}]))];

        let report = remapper.apply(&orders(), &mut records);

        assert_eq!(report.rewritten, 2);
        assert_eq!(report.changed, vec!["o1".to_string()]);
        assert_eq!(records[0].fields["customerId"], json!("C-1"));
        assert_eq!(records[0].fields["items"][0]["productId"], json!("P-99"));
        assert_eq!(records[0].fields["items"][1]["productId"], json!(REMOTE_P));
    }

    #[test]
    fn known_remote_ids_are_left_alone() {
        let remapper = remapper(UnresolvedReferencePolicy::Null);
        let mut records = vec![Record::new("o1").with_field("customerId", json!("C-1"))];
        let report = remapper.apply(&orders(), &mut records);
        assert!(report.is_noop());
    }

    #[test]
    fn defers_records_with_pending_dependencies() {
        let remapper = remapper(UnresolvedReferencePolicy::Defer);
        let mut records = vec![Record::new("o1")
            .with_field("customerId", json!("c1"))
            .with_field("items", json!([{"productId": "p2"}]))];

        let report = remapper.apply(&orders(), &mut records);

        assert!(report.deferred.contains("o1"));
        assert!(report.changed.is_empty());
        assert_eq!(records[0].fields["customerId"], json!("c1"));
    }

    #[test]
    fn nulls_dangling_references_under_either_policy() {
        for policy in [UnresolvedReferencePolicy::Defer, UnresolvedReferencePolicy::Null] {
            let remapper = remapper(policy);
            let mut records = vec![Record::new("o1").with_field("customerId", json!("c-gone"))];
            let report = remapper.apply(&orders(), &mut records);
            assert_eq!(report.nulled, 1);
            assert_eq!(records[0].fields["customerId"], Value::Null);
        }
    }

    #[test]
    fn null_policy_nulls_pending_references() {
        let remapper = remapper(UnresolvedReferencePolicy::Null);
        let mut records =
            vec![Record::new("o1").with_field("items", json!([{"productId": "p2"}]))];
        let report = remapper.apply(&orders(), &mut records);
        assert!(report.deferred.is_empty());
        assert_eq!(records[0].fields["items"][0]["productId"], Value::Null);
    }

    #[test]
    fn synced_dependents_are_not_rewritten() {
        let remapper = remapper(UnresolvedReferencePolicy::Defer);
        let mut order = Record::new("o1").with_field("customerId", json!("c1"));
        order.mark_synced("O-1".into());
        let mut records = vec![order];
        assert!(remapper.apply(&orders(), &mut records).is_noop());
        assert_eq!(records[0].fields["customerId"], json!("c1"));
    }

    #[test]
    fn strips_unresolved_values_but_keeps_nulls() {
        let remapper = remapper(UnresolvedReferencePolicy::Null);
        let mut fields = json!({
            "customerId": null,
            "items": [{"productId": "p2"}, {"productId": "P-99"}]
        })
        .as_object()
        .cloned()
        .unwrap();

        let removed = remapper.strip_unresolved(&orders(), &mut fields);

        assert_eq!(removed, 1);
        assert_eq!(fields["customerId"], Value::Null);
        assert!(fields["items"][0].get("productId").is_none());
        assert_eq!(fields["items"][1]["productId"], json!("P-99"));
    }
}
