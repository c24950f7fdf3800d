//! Request handler for the batch endpoint.

use crate::config::ServerConfig;
use crate::documents::DocumentStore;
use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tillsync_protocol::{BatchResults, SyncAction, SyncBatchRequest, SyncBatchResponse};
use tracing::debug;

/// Message returned to sellers whose plan has been marked expired.
pub const PLAN_EXPIRED: &str = "Plan expired";

/// Shared state of the handler, including test hooks.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Stored documents (shared across all handlers).
    pub documents: Arc<DocumentStore>,
    expired_sellers: RwLock<HashSet<String>>,
    rejections: RwLock<HashMap<String, String>>,
    omitted: RwLock<HashSet<String>>,
    request_counts: RwLock<HashMap<String, u64>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, documents: Arc<DocumentStore>) -> Self {
        Self {
            config,
            documents,
            expired_sellers: RwLock::new(HashSet::new()),
            rejections: RwLock::new(HashMap::new()),
            omitted: RwLock::new(HashSet::new()),
            request_counts: RwLock::new(HashMap::new()),
        }
    }

    /// Marks a seller's plan as expired or renewed.
    pub fn set_plan_expired(&self, seller: &str, expired: bool) {
        let mut sellers = self.expired_sellers.write();
        if expired {
            sellers.insert(seller.to_string());
        } else {
            sellers.remove(seller);
        }
    }

    /// Rejects every future submission of local id `id` with `error`.
    pub fn reject(&self, id: &str, error: &str) {
        self.rejections
            .write()
            .insert(id.to_string(), error.to_string());
    }

    /// Stops rejecting `id`.
    pub fn accept(&self, id: &str) {
        self.rejections.write().remove(id);
    }

    /// Leaves `id` out of replies (processed, but not reported).
    pub fn omit(&self, id: &str) {
        self.omitted.write().insert(id.to_string());
    }

    /// Returns the number of requests an endpoint received.
    pub fn request_count(&self, endpoint: &str) -> u64 {
        self.request_counts.read().get(endpoint).copied().unwrap_or(0)
    }

    /// Returns the number of requests across all endpoints.
    pub fn total_requests(&self) -> u64 {
        self.request_counts.read().values().sum()
    }

    fn count_request(&self, endpoint: &str) {
        *self
            .request_counts
            .write()
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }
}

/// Handler for batch requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one batch sent to `endpoint`.
    pub fn handle_batch(&self, endpoint: &str, request: SyncBatchRequest) -> ServerResult<SyncBatchResponse> {
        let config = &self.context.config;
        if !config.accepts(endpoint) {
            return Err(ServerError::UnknownEndpoint(endpoint.to_string()));
        }
        if request.items.len() > config.max_batch {
            return Err(ServerError::BatchTooLarge {
                size: request.items.len(),
                max: config.max_batch,
            });
        }
        self.context.count_request(endpoint);

        let seller = request.seller_context.as_str();
        if seller.is_empty() {
            return Ok(SyncBatchResponse::error("missing seller context"));
        }
        if self.context.expired_sellers.read().contains(seller) {
            return Ok(SyncBatchResponse::plan_invalid(PLAN_EXPIRED));
        }

        let rejections = self.context.rejections.read().clone();
        let omitted = self.context.omitted.read().clone();
        let mut results = BatchResults::default();

        for item in &request.items {
            if let Some(error) = rejections.get(&item.id) {
                results = results.with_failure(&item.id, error.as_str());
                continue;
            }
            if item.id.is_empty() {
                results = results.with_failure("", "missing id");
                continue;
            }

            let outcome = if item.is_deleted {
                let remote_id = self.context.documents.delete(seller, item);
                (remote_id.or_else(|| item.remote_id.clone()), SyncAction::Deleted)
            } else {
                let (remote_id, action) = self.context.documents.upsert(seller, item);
                (Some(remote_id), action)
            };

            if !omitted.contains(&item.id) {
                results = results.with_success(&item.id, outcome.0, outcome.1);
            }
        }

        debug!(
            endpoint,
            seller,
            accepted = results.success.len(),
            rejected = results.failed.len(),
            "Handled batch"
        );
        Ok(SyncBatchResponse::accepted(results))
    }
}
