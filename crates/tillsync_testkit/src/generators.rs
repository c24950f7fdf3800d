//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random records and backend reply
//! plans that keep the invariants the engine relies on (unique local ids,
//! well-formed remote ids).

use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tillsync_engine::{Record, LOCAL_ID_PREFIX};

/// How the backend treats one submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPlan {
    /// Accepted with a remote id.
    Accept,
    /// Rejected with an error.
    Reject,
    /// Processed but missing from the reply.
    Omit,
}

/// Strategy for generating device-local ids.
pub fn local_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f0-9]{8}")
        .expect("Invalid regex")
        .prop_map(|suffix| format!("{}{}", LOCAL_ID_PREFIX, suffix))
}

/// Strategy for generating 24-hex backend ids.
pub fn remote_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{24}").expect("Invalid regex")
}

/// Strategy for generating a scalar payload value.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[A-Za-z ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::String),
        Just(Value::Null),
    ]
}

/// Strategy for generating a business payload.
///
/// Keys never start with an underscore, so nothing is stripped.
pub fn payload_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z][a-zA-Z]{0,9}").expect("Invalid regex"),
        scalar_strategy(),
        0..6,
    )
    .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating one unsynced record.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (local_id_strategy(), payload_strategy()).prop_map(|(id, fields)| {
        let mut record = Record::new(id);
        record.fields = fields;
        record
    })
}

/// Strategy for generating unsynced records with distinct local ids.
pub fn records_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_set(local_id_strategy(), 1..=max.max(1)).prop_flat_map(
        |ids: BTreeSet<String>| {
            let ids: Vec<String> = ids.into_iter().collect();
            let count = ids.len();
            prop::collection::vec(payload_strategy(), count).prop_map(move |payloads| {
                ids.iter()
                    .zip(payloads)
                    .map(|(id, fields)| {
                        let mut record = Record::new(id.clone());
                        record.fields = fields;
                        record
                    })
                    .collect()
            })
        },
    )
}

/// Strategy for generating one reply plan.
pub fn reply_plan_strategy() -> impl Strategy<Value = ReplyPlan> {
    prop_oneof![
        3 => Just(ReplyPlan::Accept),
        1 => Just(ReplyPlan::Reject),
        1 => Just(ReplyPlan::Omit),
    ]
}

/// Strategy for generating records paired with how the backend treats each.
pub fn planned_batch_strategy(max: usize) -> impl Strategy<Value = Vec<(Record, ReplyPlan)>> {
    records_strategy(max).prop_flat_map(|records| {
        let count = records.len();
        prop::collection::vec(reply_plan_strategy(), count)
            .prop_map(move |plans| records.clone().into_iter().zip(plans).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn local_ids_carry_the_prefix(id in local_id_strategy()) {
            prop_assert!(id.starts_with(LOCAL_ID_PREFIX));
        }

        #[test]
        fn remote_ids_are_object_ids(id in remote_id_strategy()) {
            prop_assert_eq!(id.len(), 24);
            prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn generated_records_have_unique_ids(records in records_strategy(12)) {
            let ids: BTreeSet<_> = records.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(ids.len(), records.len());
            prop_assert!(records.iter().all(Record::needs_sync));
        }

        #[test]
        fn plans_cover_every_record(batch in planned_batch_strategy(8)) {
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= 8);
        }
    }
}
