//! Per-record retry accounting.

use crate::config::RetryConfig;
use crate::record::{EntityType, Record};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct RetryEntry {
    failures: u32,
    fingerprint: String,
}

/// Tracks consecutive failures per record and bounds automatic retries.
///
/// Counts are keyed by `(entity type, local id)` and tied to the record's
/// content hash at the time of the failure: once the business layer mutates
/// the record, its budget starts over. Records never seen by this tracker
/// fall back to their persisted `sync_attempts`, so the bound survives
/// restarts.
#[derive(Debug)]
pub struct RetryTracker {
    config: RetryConfig,
    entries: HashMap<(EntityType, String), RetryEntry>,
}

impl RetryTracker {
    /// Creates an empty tracker.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the consecutive failures charged to `record`.
    pub fn attempts(&self, entity: &EntityType, record: &Record) -> u32 {
        match self.entries.get(&(entity.clone(), record.id.clone())) {
            Some(entry) if entry.fingerprint == record.content_hash() => entry.failures,
            Some(_) => 0,
            None => record.sync_attempts,
        }
    }

    /// Returns true if `record` may still be retried automatically.
    pub fn should_retry(&self, entity: &EntityType, record: &Record) -> bool {
        !self.config.is_exhausted(self.attempts(entity, record))
    }

    /// Charges one failed attempt and returns the new count.
    pub fn record_failure(&mut self, entity: &EntityType, record: &Record) -> u32 {
        let failures = self.attempts(entity, record).saturating_add(1);
        self.entries.insert(
            (entity.clone(), record.id.clone()),
            RetryEntry {
                failures,
                fingerprint: record.content_hash(),
            },
        );
        failures
    }

    /// Clears the count after a success or a confirmed deletion.
    pub fn clear(&mut self, entity: &EntityType, id: &str) {
        self.entries.remove(&(entity.clone(), id.to_string()));
    }

    /// Returns the number of records whose budget is spent.
    pub fn exhausted_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| self.config.is_exhausted(e.failures))
            .count()
    }
}
