//! Property tests for sweep reconciliation against the reference backend.

use proptest::prelude::*;
use tillsync_engine::retail;
use tillsync_testkit::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_record_is_accounted_for(batch in planned_batch_strategy(16)) {
        let harness = SyncHarness::new();
        for (record, plan) in &batch {
            match plan {
                ReplyPlan::Accept => {}
                ReplyPlan::Reject => harness.server.reject(&record.id, "rejected"),
                ReplyPlan::Omit => harness.server.omit(&record.id),
            }
            harness.insert(retail::CUSTOMERS, record.clone());
        }

        let summary = runtime().block_on(harness.sweep());
        let result = SyncHarness::result(&summary, retail::CUSTOMERS);
        let accepted = batch.iter().filter(|(_, p)| *p == ReplyPlan::Accept).count();

        prop_assert_eq!(result.synced + result.failed, batch.len());
        prop_assert_eq!(result.synced, accepted);
        prop_assert_eq!(result.outcomes.len(), batch.len());
        prop_assert_eq!(harness.server.request_count("customers"), 1);
    }

    #[test]
    fn local_identity_is_never_rewritten(batch in planned_batch_strategy(16)) {
        let harness = SyncHarness::new();
        for (record, plan) in &batch {
            if *plan == ReplyPlan::Reject {
                harness.server.reject(&record.id, "rejected");
            }
            harness.insert(retail::CUSTOMERS, record.clone());
        }

        runtime().block_on(harness.sweep());

        for (original, plan) in &batch {
            let stored = harness.get(retail::CUSTOMERS, &original.id);
            prop_assert!(stored.is_some());
            let stored = stored.unwrap();
            prop_assert_eq!(&stored.id, &original.id);
            prop_assert_eq!(&stored.fields, &original.fields);
            match plan {
                ReplyPlan::Reject => {
                    prop_assert!(!stored.is_synced);
                    prop_assert_eq!(stored.sync_attempts, 1);
                    prop_assert!(stored.remote_id.is_none());
                }
                _ => {
                    let remote_id = harness.verify_remote(retail::CUSTOMERS, &original.id);
                    prop_assert_ne!(remote_id, original.id.clone());
                }
            }
        }
    }
}
