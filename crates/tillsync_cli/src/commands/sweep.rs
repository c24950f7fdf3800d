//! Sweep command implementation.
//!
//! Loads a snapshot into memory stores, runs one sweep against an
//! in-process reference backend and writes the outcome back.

use crate::snapshot::Snapshot;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tillsync_engine::{
    retail, EntityType, HttpTransport, LoopbackClient, LoopbackServer, MemoryRecordStore, Record,
    StaticSession, SweepSummary, SyncConfig, SyncEngine, SyncObserver,
};
use tillsync_server::{ServerConfig, SyncServer};
use tracing::{debug, info};

/// Serves loopback posts from the reference backend.
struct InProcessBackend(Arc<SyncServer>);

impl LoopbackServer for InProcessBackend {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_json(path, body)
    }
}

struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_item_synced(&self, entity: &EntityType, record: &Record) {
        debug!(entity = %entity, id = %record.id, remote_id = ?record.remote_id, "Item synced");
    }
}

/// Per-type line of the sweep report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReport {
    /// Entity type.
    pub entity_type: String,
    /// Endpoint it was sent to.
    pub endpoint: String,
    /// Accepted records.
    pub synced: usize,
    /// Failed records.
    pub failed: usize,
    /// Held-back records.
    pub skipped: usize,
    /// Local store error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of the sweep command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// True if nothing failed and the sweep ran to completion.
    pub success: bool,
    /// Accepted records.
    pub total_synced: usize,
    /// Failed records.
    pub total_failed: usize,
    /// Held-back records.
    pub total_skipped: usize,
    /// Why the sweep stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<String>,
    /// Per-type results in sync order.
    pub entities: Vec<EntityReport>,
}

impl From<&SweepSummary> for SweepReport {
    fn from(summary: &SweepSummary) -> Self {
        Self {
            success: summary.success,
            total_synced: summary.total_synced,
            total_failed: summary.total_failed,
            total_skipped: summary.total_skipped,
            halt: summary.halt.as_ref().map(ToString::to_string),
            entities: summary
                .per_entity
                .iter()
                .map(|r| EntityReport {
                    entity_type: r.entity_type.to_string(),
                    endpoint: r.endpoint.clone(),
                    synced: r.synced,
                    failed: r.failed,
                    skipped: r.skipped,
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}

/// Picks the first id the backend may mint without colliding with ids
/// already present in the snapshot.
fn first_free_remote_id(snapshot: &Snapshot) -> u64 {
    snapshot
        .entity_types()
        .flat_map(|entity| snapshot.records(entity))
        .filter_map(|r| r.remote_id.as_deref())
        .filter_map(|id| u64::from_str_radix(id, 16).ok())
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

/// Runs one sweep over `snapshot` and stores the results back into it.
pub async fn sweep(
    snapshot: &mut Snapshot,
    seller: &str,
) -> Result<Arc<SweepSummary>, Box<dyn std::error::Error>> {
    let catalogue = retail::catalogue();
    let known: Vec<&str> = catalogue.iter().map(|d| d.entity_type.as_str()).collect();
    snapshot.check_entities(&known)?;

    let server = Arc::new(SyncServer::new(
        ServerConfig::default().with_first_remote_id(first_free_remote_id(snapshot)),
    ));
    let transport = HttpTransport::new(
        "http://localhost",
        LoopbackClient::new(InProcessBackend(server)),
    );

    let mut builder = SyncEngine::builder(SyncConfig::default())
        .transport(Arc::new(transport))
        .session(Arc::new(StaticSession::new(seller)))
        .observer(Arc::new(LogObserver));
    let mut stores = Vec::new();
    for descriptor in catalogue.iter().cloned() {
        let entity = descriptor.entity_type.to_string();
        let store = Arc::new(MemoryRecordStore::with_records(
            snapshot.records(&entity).iter().cloned(),
        ));
        stores.push((entity, Arc::clone(&store)));
        builder = builder.entity(descriptor, store);
    }
    let engine = builder.build()?;

    info!(seller, "Running sweep");
    let summary = engine.run_all().await;

    for (entity, store) in stores {
        let records = store.snapshot();
        if !records.is_empty() || !snapshot.records(&entity).is_empty() {
            snapshot.set_records(entity, records);
        }
    }
    Ok(summary)
}

/// Runs the sweep command.
pub fn run(path: &Path, seller: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = Snapshot::load(path)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(sweep(&mut snapshot, seller))?;
    snapshot.save(path)?;

    let report = SweepReport::from(summary.as_ref());
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }

    if report.halt.is_some() {
        return Err("Sweep halted".into());
    }
    Ok(())
}

fn print_text_output(report: &SweepReport) {
    for entity in &report.entities {
        println!(
            "  {:<18} -> {:<16} synced {:>4}  failed {:>4}  skipped {:>4}",
            entity.entity_type, entity.endpoint, entity.synced, entity.failed, entity.skipped
        );
        if let Some(error) = &entity.error {
            println!("    error: {}", error);
        }
    }
    println!();
    match &report.halt {
        Some(halt) => println!("✗ Sweep halted: {}", halt),
        None if report.success => println!("✓ Sweep completed: {} synced", report.total_synced),
        None => println!(
            "✗ Sweep completed with failures: {} synced, {} failed",
            report.total_synced, report.total_failed
        ),
    }
}
