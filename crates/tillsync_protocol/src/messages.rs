//! Protocol messages for batch sync.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path prefix under which every endpoint is exposed.
pub const DEFAULT_ENDPOINT_PREFIX: &str = "/sync/";

/// Builds the request path for an endpoint, e.g. `/sync/orders`.
pub fn endpoint_path(prefix: &str, endpoint: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", prefix, endpoint)
}

/// What the backend did with an accepted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// The backend created a new document.
    Created,
    /// An existing document was updated.
    Updated,
    /// The document was deleted remotely.
    Deleted,
    /// Nothing changed remotely.
    Skipped,
}

impl Default for SyncAction {
    fn default() -> Self {
        SyncAction::Updated
    }
}

/// A cleaned record as it travels to the backend.
///
/// Only identity and tombstone fields travel alongside the payload; the
/// sync diagnostics kept on the local record are never transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundItem {
    /// Local identity, used to correlate the response.
    pub id: String,
    /// Entity type the record belongs to.
    pub entity_type: String,
    /// Backend identity, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Whether the record is a local tombstone.
    #[serde(default)]
    pub is_deleted: bool,
    /// Business payload.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutboundItem {
    /// Creates an item with an empty payload.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            remote_id: None,
            is_deleted: false,
            fields: Map::new(),
        }
    }
}

/// Batch request body for `POST /sync/{endpoint}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchRequest {
    /// Seller/session identifier the batch belongs to.
    pub seller_context: String,
    /// Items to reconcile.
    pub items: Vec<OutboundItem>,
}

impl SyncBatchRequest {
    /// Creates a new batch request.
    pub fn new(seller_context: impl Into<String>, items: Vec<OutboundItem>) -> Self {
        Self {
            seller_context: seller_context.into(),
            items,
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }
}

/// An item the backend accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSuccess {
    /// Local identity echoed back.
    pub id: String,
    /// Backend identity of the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// What the backend did.
    #[serde(default)]
    pub action: SyncAction,
}

/// An item the backend rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Local identity echoed back.
    pub id: String,
    /// Rejection reason.
    pub error: String,
}

/// Per-item outcomes of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Accepted items.
    #[serde(default)]
    pub success: Vec<ItemSuccess>,
    /// Rejected items.
    #[serde(default)]
    pub failed: Vec<ItemFailure>,
}

impl BatchResults {
    /// Adds an accepted item.
    pub fn with_success(
        mut self,
        id: impl Into<String>,
        remote_id: Option<String>,
        action: SyncAction,
    ) -> Self {
        self.success.push(ItemSuccess {
            id: id.into(),
            remote_id,
            action,
        });
        self
    }

    /// Adds a rejected item.
    pub fn with_failure(mut self, id: impl Into<String>, error: impl Into<String>) -> Self {
        self.failed.push(ItemFailure {
            id: id.into(),
            error: error.into(),
        });
        self
    }

    /// Total number of outcomes.
    pub fn len(&self) -> usize {
        self.success.len() + self.failed.len()
    }

    /// Returns true if there are no outcomes.
    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.failed.is_empty()
    }
}

/// Batch response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchResponse {
    /// Whether the batch as a whole was processed.
    pub success: bool,
    /// Per-item outcomes.
    #[serde(default)]
    pub results: BatchResults,
    /// Set when the seller's plan or session no longer allows syncing.
    #[serde(default)]
    pub plan_invalid: bool,
    /// Batch-level error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncBatchResponse {
    /// Creates a successful response.
    pub fn accepted(results: BatchResults) -> Self {
        Self {
            success: true,
            results,
            plan_invalid: false,
            error: None,
        }
    }

    /// Creates a plan/session invalid response.
    pub fn plan_invalid(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: BatchResults::default(),
            plan_invalid: true,
            error: Some(message.into()),
        }
    }

    /// Creates a failed response without per-item outcomes.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: BatchResults::default(),
            plan_invalid: false,
            error: Some(message.into()),
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }
}
