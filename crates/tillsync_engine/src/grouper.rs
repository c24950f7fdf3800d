//! Grouping of entity types that share an endpoint.

use crate::descriptor::EntityDescriptor;
use crate::error::{SyncError, SyncResult};
use crate::record::EntityType;
use std::collections::{HashMap, HashSet};

/// Entity types sent to one endpoint as a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointGroup {
    /// Shared endpoint.
    pub endpoint: String,
    /// Member types in declaration order.
    pub members: Vec<EntityType>,
}

impl EndpointGroup {
    /// Returns true if `entity` belongs to this group.
    pub fn contains(&self, entity: &EntityType) -> bool {
        self.members.contains(entity)
    }
}

/// Groups descriptors by endpoint.
///
/// Groups are ordered by the first declaration of their endpoint, so the
/// declared dependency order is preserved at group granularity.
pub fn group_by_endpoint(descriptors: &[EntityDescriptor]) -> Vec<EndpointGroup> {
    let mut groups: Vec<EndpointGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for descriptor in descriptors {
        match index.get(descriptor.endpoint.as_str()) {
            Some(&i) => groups[i].members.push(descriptor.entity_type.clone()),
            None => {
                index.insert(descriptor.endpoint.as_str(), groups.len());
                groups.push(EndpointGroup {
                    endpoint: descriptor.endpoint.clone(),
                    members: vec![descriptor.entity_type.clone()],
                });
            }
        }
    }

    groups
}

/// Checks that descriptors can be synced in the grouped order.
///
/// Entity names must be unique, and every foreign key must point at a
/// registered type whose group is synced no later than the dependent's.
pub fn validate_order(descriptors: &[EntityDescriptor], groups: &[EndpointGroup]) -> SyncResult<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if !seen.insert(&descriptor.entity_type) {
            return Err(SyncError::Configuration(format!(
                "entity type {} registered twice",
                descriptor.entity_type
            )));
        }
    }

    let group_of = |entity: &EntityType| groups.iter().position(|g| g.contains(entity));

    for descriptor in descriptors {
        let own = group_of(&descriptor.entity_type);
        for fk in &descriptor.foreign_keys {
            let target = group_of(&fk.target).ok_or_else(|| {
                SyncError::Configuration(format!(
                    "{}.{} references unknown entity type {}",
                    descriptor.entity_type,
                    fk.path.as_str(),
                    fk.target
                ))
            })?;
            if Some(target) > own {
                return Err(SyncError::Configuration(format!(
                    "{} depends on {} which is synced after it",
                    descriptor.entity_type, fk.target
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_endpoints_are_merged_in_order() {
        let descriptors = vec![
            EntityDescriptor::new("products", "products"),
            EntityDescriptor::new("transactions", "transactions"),
            EntityDescriptor::new("refunds", "transactions"),
            EntityDescriptor::new("settings", "settings"),
        ];
        let groups = group_by_endpoint(&descriptors);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].endpoint, "transactions");
        assert_eq!(
            groups[1].members,
            vec![EntityType::from("transactions"), EntityType::from("refunds")]
        );
        assert_eq!(groups[2].endpoint, "settings");
    }

    #[test]
    fn rejects_forward_dependencies() {
        let descriptors = vec![
            EntityDescriptor::new("orders", "orders").foreign_key("productId", "products"),
            EntityDescriptor::new("products", "products"),
        ];
        let groups = group_by_endpoint(&descriptors);
        assert!(matches!(
            validate_order(&descriptors, &groups),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_unknown_targets_and_duplicates() {
        let unknown = vec![EntityDescriptor::new("orders", "orders").foreign_key("x", "ghosts")];
        assert!(validate_order(&unknown, &group_by_endpoint(&unknown)).is_err());

        let duplicate = vec![
            EntityDescriptor::new("orders", "orders"),
            EntityDescriptor::new("orders", "orders-v2"),
        ];
        assert!(validate_order(&duplicate, &group_by_endpoint(&duplicate)).is_err());
    }

    #[test]
    fn allows_self_and_same_group_references() {
        let descriptors = vec![
            EntityDescriptor::new("categories", "categories").foreign_key("parentId", "categories"),
            EntityDescriptor::new("batches", "inventory"),
            EntityDescriptor::new("adjustments", "inventory").foreign_key("batchId", "batches"),
        ];
        let groups = group_by_endpoint(&descriptors);
        assert!(validate_order(&descriptors, &groups).is_ok());
    }
}
