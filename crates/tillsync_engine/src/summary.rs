//! Sweep and per-entity results.

use crate::record::EntityType;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tillsync_protocol::SyncAction;

/// Result of one record in a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Local identity.
    pub id: String,
    /// Backend identity after the sweep, if known.
    pub remote_id: Option<String>,
    /// What happened. Failed and held-back records report `Skipped`.
    pub action: SyncAction,
    /// Failure reason.
    pub error: Option<String>,
}

impl SyncOutcome {
    pub(crate) fn success(id: &str, remote_id: Option<String>, action: SyncAction) -> Self {
        Self {
            id: id.to_string(),
            remote_id,
            action,
            error: None,
        }
    }

    pub(crate) fn failure(id: &str, remote_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            remote_id,
            action: SyncAction::Skipped,
            error: Some(error.into()),
        }
    }

    /// Returns true if the record was accepted or held back without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one entity type within a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySyncResult {
    /// Entity type.
    pub entity_type: EntityType,
    /// Endpoint the type was sent to.
    pub endpoint: String,
    /// Records accepted by the backend.
    pub synced: usize,
    /// Records that failed.
    pub failed: usize,
    /// Records held back from this sweep, or accepted with content that has
    /// since changed locally.
    pub skipped: usize,
    /// Local store error that aborted this type.
    pub error: Option<String>,
    /// Per-record outcomes.
    pub outcomes: Vec<SyncOutcome>,
}

impl EntitySyncResult {
    /// Creates an empty result.
    pub fn new(entity_type: EntityType, endpoint: impl Into<String>) -> Self {
        Self {
            entity_type,
            endpoint: endpoint.into(),
            synced: 0,
            failed: 0,
            skipped: 0,
            error: None,
            outcomes: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, outcome: SyncOutcome) {
        if outcome.error.is_some() {
            self.failed += 1;
        } else if outcome.action == SyncAction::Skipped {
            self.skipped += 1;
        } else {
            self.synced += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Folds in a follow-up pass over records this result held back.
    pub(crate) fn absorb(&mut self, later: EntitySyncResult) {
        let revisited: HashSet<String> = later.outcomes.iter().map(|o| o.id.clone()).collect();
        let before = self.outcomes.len();
        self.outcomes.retain(|o| !revisited.contains(&o.id));
        self.skipped = self.skipped.saturating_sub(before - self.outcomes.len());

        self.synced += later.synced;
        self.failed += later.failed;
        self.skipped += later.skipped;
        self.outcomes.extend(later.outcomes);
        if self.error.is_none() {
            self.error = later.error;
        }
    }
}

/// Why a sweep stopped before finishing every entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepHalt {
    /// No connectivity; nothing was attempted.
    Offline,
    /// No seller context; nothing was attempted.
    MissingSession,
    /// The backend reported the plan or session invalid.
    PlanInvalid(String),
    /// The sweep task ended abnormally.
    Aborted(String),
}

impl fmt::Display for SweepHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepHalt::Offline => f.write_str("offline"),
            SweepHalt::MissingSession => f.write_str("no seller context"),
            SweepHalt::PlanInvalid(message) => write!(f, "plan invalid: {}", message),
            SweepHalt::Aborted(message) => write!(f, "aborted: {}", message),
        }
    }
}

/// Summary of one sweep.
#[derive(Debug, Clone)]
pub struct SweepSummary {
    /// True if every type synced without failures and the sweep was not halted.
    pub success: bool,
    /// Records accepted across all types.
    pub total_synced: usize,
    /// Records failed across all types.
    pub total_failed: usize,
    /// Records held back across all types.
    pub total_skipped: usize,
    /// Per-type results in sync order.
    pub per_entity: Vec<EntitySyncResult>,
    /// Why the sweep stopped early, if it did.
    pub halt: Option<SweepHalt>,
    /// When the sweep started.
    pub started_at: DateTime<Utc>,
    /// How long it took.
    pub duration: Duration,
}

impl SweepSummary {
    /// Builds a summary from per-type results.
    pub fn from_results(
        per_entity: Vec<EntitySyncResult>,
        halt: Option<SweepHalt>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let total_synced = per_entity.iter().map(|r| r.synced).sum();
        let total_failed = per_entity.iter().map(|r| r.failed).sum();
        let total_skipped = per_entity.iter().map(|r| r.skipped).sum();
        let store_errors = per_entity.iter().any(|r| r.error.is_some());

        Self {
            success: halt.is_none() && total_failed == 0 && !store_errors,
            total_synced,
            total_failed,
            total_skipped,
            per_entity,
            halt,
            started_at,
            duration,
        }
    }

    /// A sweep that stopped before doing any work.
    pub fn halted(halt: SweepHalt, started_at: DateTime<Utc>) -> Self {
        Self::from_results(Vec::new(), Some(halt), started_at, Duration::ZERO)
    }

    /// Returns the result of one entity type.
    pub fn result_for(&self, entity: &str) -> Option<&EntitySyncResult> {
        self.per_entity
            .iter()
            .find(|r| r.entity_type.as_str() == entity)
    }

    /// Returns true if the backend reported the plan or session invalid.
    pub fn is_plan_invalid(&self) -> bool {
        matches!(self.halt, Some(SweepHalt::PlanInvalid(_)))
    }
}
