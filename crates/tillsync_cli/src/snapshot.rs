//! JSON snapshots of the local dataset.
//!
//! A snapshot is one object keyed by entity type, each holding the records
//! of that type: `{"customers": [{"id": "c1", ...}], "orders": [...]}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tillsync_engine::Record;

/// Errors reading or writing a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// File could not be read or written.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a valid snapshot.
    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot holds an entity type the catalogue does not know.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
}

/// Records of every entity type, in stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entities: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    /// Reads a snapshot from `path`.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the snapshot to `path`, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let body = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Returns the records of `entity`.
    pub fn records(&self, entity: &str) -> &[Record] {
        self.entities.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the records of `entity`.
    pub fn set_records(&mut self, entity: impl Into<String>, records: Vec<Record>) {
        self.entities.insert(entity.into(), records);
    }

    /// Returns the entity types present.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Fails if the snapshot holds a type outside `known`.
    pub fn check_entities(&self, known: &[&str]) -> Result<(), SnapshotError> {
        match self.entity_types().find(|e| !known.contains(e)) {
            Some(unknown) => Err(SnapshotError::UnknownEntity(unknown.to_string())),
            None => Ok(()),
        }
    }
}
