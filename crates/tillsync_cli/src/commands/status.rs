//! Status command implementation.

use crate::snapshot::Snapshot;
use serde::Serialize;
use std::path::Path;
use tillsync_engine::{retail, Record, RetryConfig};

/// Sync state of one entity type.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    /// Entity type.
    pub entity_type: String,
    /// Records, tombstones included.
    pub total: usize,
    /// Records awaiting acceptance.
    pub pending: usize,
    /// Pending records whose last attempt failed.
    pub failed: usize,
    /// Failed records no longer retried automatically.
    pub exhausted: usize,
    /// Tombstones awaiting confirmation.
    pub tombstones: usize,
}

impl EntityStatus {
    fn collect(entity_type: &str, records: &[Record], retry: &RetryConfig) -> Self {
        let mut status = Self {
            entity_type: entity_type.to_string(),
            total: records.len(),
            ..Self::default()
        };
        for record in records.iter().filter(|r| r.needs_sync()) {
            status.pending += 1;
            if record.sync_error.is_some() {
                status.failed += 1;
            }
            if retry.is_exhausted(record.sync_attempts) {
                status.exhausted += 1;
            }
            if record.is_deleted {
                status.tombstones += 1;
            }
        }
        status
    }
}

/// Computes the status of every catalogue type, in sync order.
pub fn collect(snapshot: &Snapshot) -> Vec<EntityStatus> {
    let retry = RetryConfig::default();
    retail::catalogue()
        .iter()
        .map(|d| {
            let entity = d.entity_type.as_str();
            EntityStatus::collect(entity, snapshot.records(entity), &retry)
        })
        .collect()
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = Snapshot::load(path)?;
    let statuses = collect(&snapshot);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        _ => print_text_output(path, &statuses),
    }

    Ok(())
}

fn print_text_output(path: &Path, statuses: &[EntityStatus]) {
    println!("Tillsync Snapshot Status");
    println!("========================");
    println!();
    println!("Path: {}", path.display());
    println!();
    println!(
        "  {:<18} {:>6} {:>8} {:>7} {:>10} {:>11}",
        "entity", "total", "pending", "failed", "exhausted", "tombstones"
    );
    for s in statuses {
        println!(
            "  {:<18} {:>6} {:>8} {:>7} {:>10} {:>11}",
            s.entity_type, s.total, s.pending, s.failed, s.exhausted, s.tombstones
        );
    }

    let pending: usize = statuses.iter().map(|s| s.pending).sum();
    let exhausted: usize = statuses.iter().map(|s| s.exhausted).sum();
    println!();
    println!("Pending: {}", pending);
    if exhausted > 0 {
        println!("Exhausted: {} (edit the records to retry)", exhausted);
    }
}
