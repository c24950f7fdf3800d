//! Main sync server.

use crate::config::ServerConfig;
use crate::documents::{DocumentStore, StoredDocument};
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use std::sync::Arc;
use tillsync_protocol::{SyncBatchRequest, SyncBatchResponse};

/// The reference backend.
///
/// Implements `POST {prefix}{endpoint}` for JSON batch bodies in process.
/// Test hooks let callers expire a seller's plan, reject specific items or
/// drop them from replies.
///
/// # Example
///
/// ```
/// use tillsync_server::{ServerConfig, SyncServer};
/// use tillsync_protocol::{OutboundItem, SyncBatchRequest};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let request = SyncBatchRequest::new("seller-1", vec![OutboundItem::new("c1", "customers")]);
/// let response = server.handle_batch("/sync/customers", request).unwrap();
/// assert!(response.success);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        let documents = Arc::new(DocumentStore::with_first_id(config.first_remote_id));
        Self::with_documents(config, documents)
    }

    /// Creates a sync server over existing documents.
    pub fn with_documents(config: ServerConfig, documents: Arc<DocumentStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, documents));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    fn endpoint<'a>(&self, path: &'a str) -> ServerResult<&'a str> {
        path.strip_prefix(self.context.config.endpoint_prefix.as_str())
            .filter(|e| !e.is_empty() && !e.contains('/'))
            .ok_or_else(|| ServerError::UnknownEndpoint(path.to_string()))
    }

    /// Handles a decoded batch posted to `path`.
    pub fn handle_batch(&self, path: &str, request: SyncBatchRequest) -> Result<SyncBatchResponse, String> {
        let endpoint = self.endpoint(path).map_err(|e| e.to_string())?;
        self.handler
            .handle_batch(endpoint, request)
            .map_err(|e| e.to_string())
    }

    /// Handles a JSON body posted to `path` and returns the JSON reply.
    pub fn handle_json(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let request = SyncBatchRequest::decode(body)
            .map_err(ServerError::from)
            .map_err(|e| e.to_string())?;
        let response = self.handle_batch(path, request)?;
        response
            .encode()
            .map_err(ServerError::from)
            .map_err(|e| e.to_string())
    }

    /// Marks a seller's plan as expired.
    pub fn expire_plan(&self, seller: &str) {
        self.context.set_plan_expired(seller, true);
    }

    /// Renews a seller's plan.
    pub fn renew_plan(&self, seller: &str) {
        self.context.set_plan_expired(seller, false);
    }

    /// Rejects every future submission of local id `id`.
    pub fn reject(&self, id: &str, error: &str) {
        self.context.reject(id, error);
    }

    /// Stops rejecting `id`.
    pub fn accept(&self, id: &str) {
        self.context.accept(id);
    }

    /// Processes `id` but leaves it out of replies.
    pub fn omit(&self, id: &str) {
        self.context.omit(id);
    }

    /// Returns the number of requests an endpoint received.
    pub fn request_count(&self, endpoint: &str) -> u64 {
        self.context.request_count(endpoint)
    }

    /// Returns the number of requests across all endpoints.
    pub fn total_requests(&self) -> u64 {
        self.context.total_requests()
    }

    /// Returns the stored documents.
    pub fn documents(&self) -> &DocumentStore {
        &self.context.documents
    }

    /// Returns the document a seller submitted under a local id.
    pub fn find(&self, seller: &str, entity_type: &str, local_id: &str) -> Option<StoredDocument> {
        self.context
            .documents
            .find_by_local(seller, entity_type, local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tillsync_protocol::{OutboundItem, SyncAction};

    #[test]
    fn server_lifecycle() {
        let server = SyncServer::new(ServerConfig::default());
        assert_eq!(server.total_requests(), 0);
        assert!(server.documents().is_empty());
    }

    #[test]
    fn json_round_trip_over_path() {
        let server = SyncServer::new(ServerConfig::default());
        let body = br#"{"sellerContext":"s1","items":[{"id":"c1","entityType":"customers","name":"Ada"}]}"#;

        let reply = server.handle_json("/sync/customers", body).unwrap();
        let response = SyncBatchResponse::decode(&reply).unwrap();

        assert!(response.success);
        assert_eq!(response.results.success[0].id, "c1");
        assert_eq!(response.results.success[0].action, SyncAction::Created);
        let stored = server.find("s1", "customers", "c1").unwrap();
        assert_eq!(stored.fields["name"], "Ada");
        assert_eq!(server.request_count("customers"), 1);
    }

    #[test]
    fn rejects_paths_outside_prefix() {
        let server = SyncServer::new(ServerConfig::default());
        let request = SyncBatchRequest::new("s1", vec![OutboundItem::new("c1", "customers")]);
        assert!(server.handle_batch("/api/customers", request.clone()).is_err());
        assert!(server.handle_batch("/sync/", request).is_err());
    }

    #[test]
    fn malformed_body_is_an_error() {
        let server = SyncServer::new(ServerConfig::default());
        assert!(server.handle_json("/sync/customers", b"not json").is_err());
    }

    #[test]
    fn plan_expiry_can_be_lifted() {
        let server = SyncServer::new(ServerConfig::default());
        let request = SyncBatchRequest::new("s1", vec![OutboundItem::new("c1", "customers")]);

        server.expire_plan("s1");
        assert!(server.handle_batch("/sync/customers", request.clone()).unwrap().plan_invalid);

        server.renew_plan("s1");
        assert!(server.handle_batch("/sync/customers", request).unwrap().success);
    }

    #[test]
    fn shared_documents() {
        let documents = Arc::new(DocumentStore::new());
        let server = SyncServer::with_documents(ServerConfig::default(), Arc::clone(&documents));
        let request = SyncBatchRequest::new("s1", vec![OutboundItem::new("c1", "customers")]);
        server.handle_batch("/sync/customers", request).unwrap();
        assert_eq!(documents.len(), 1);
    }
}
