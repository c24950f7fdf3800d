//! Records and entity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Prefix of identities minted on the device.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Name of a record collection, e.g. `"orders"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Creates an entity type.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// One business entity plus its sync-control fields.
///
/// The business layer owns `fields`; the engine owns everything else
/// except `id`, which never changes once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Local identity, the only correlation key with the backend.
    pub id: String,
    /// Backend identity, once accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// True only when the latest local mutation was accepted remotely.
    #[serde(default, deserialize_with = "tri_state")]
    pub is_synced: bool,
    /// Local tombstone.
    #[serde(default, deserialize_with = "tri_state")]
    pub is_deleted: bool,
    /// Last sync failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    /// Consecutive failed attempts.
    #[serde(default)]
    pub sync_attempts: u32,
    /// When the last failed attempt happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    /// Business payload.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// `null` and missing both mean "not set".
fn tri_state<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl Record {
    /// Creates an unsynced record with an empty payload.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote_id: None,
            is_synced: false,
            is_deleted: false,
            sync_error: None,
            sync_attempts: 0,
            last_sync_attempt_at: None,
            fields: Map::new(),
        }
    }

    /// Creates an unsynced record with a freshly minted local id.
    pub fn new_local() -> Self {
        Self::new(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Adds a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Returns a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a payload field as a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Sets a payload field and marks the record as modified.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
        self.touch();
    }

    /// Marks a local mutation.
    ///
    /// The record becomes pending again and its retry budget is reset.
    pub fn touch(&mut self) {
        self.is_synced = false;
        self.sync_error = None;
        self.sync_attempts = 0;
        self.last_sync_attempt_at = None;
    }

    /// Turns the record into a tombstone awaiting remote confirmation.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    /// Returns true if a local mutation has not been accepted yet.
    pub fn needs_sync(&self) -> bool {
        !self.is_synced
    }

    /// Records a backend acceptance. The local `id` is left untouched.
    pub fn mark_synced(&mut self, remote_id: String) {
        self.remote_id = Some(remote_id);
        self.is_synced = true;
        self.sync_error = None;
        self.sync_attempts = 0;
        self.last_sync_attempt_at = None;
    }

    /// Records a failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>, attempts: u32, at: DateTime<Utc>) {
        self.is_synced = false;
        self.sync_error = Some(error.into());
        self.sync_attempts = attempts;
        self.last_sync_attempt_at = Some(at);
    }

    /// SHA-256 of the payload and tombstone flag, hex encoded.
    ///
    /// Sync-control fields are excluded so the hash only moves on
    /// business mutations.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::json!({
            "deleted": self.is_deleted,
            "fields": self.fields,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
