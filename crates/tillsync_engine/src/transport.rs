//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tillsync_protocol::{SyncBatchRequest, SyncBatchResponse};

/// A sync transport handles network communication with the backend.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, in-process loopback, mock for testing, etc.).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Submits one batch to `path` (e.g. `/sync/orders`).
    async fn submit(&self, path: &str, request: &SyncBatchRequest) -> SyncResult<SyncBatchResponse>;

    /// Returns true if connectivity is currently available.
    fn is_online(&self) -> bool;
}

type Responder =
    Arc<dyn Fn(&str, &SyncBatchRequest) -> SyncResult<SyncBatchResponse> + Send + Sync>;

/// A mock transport for testing.
///
/// Replies are taken from a per-path queue first, then from the responder
/// if one is set.
#[derive(Default)]
pub struct MockTransport {
    online: AtomicBool,
    queued: Mutex<HashMap<String, VecDeque<SyncResult<SyncBatchResponse>>>>,
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<(String, SyncBatchRequest)>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Creates a new, online mock transport.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues a response for `path`.
    pub fn push_response(&self, path: &str, response: SyncBatchResponse) {
        self.queued
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    /// Queues a transport failure for `path`.
    pub fn push_error(&self, path: &str, error: SyncError) {
        self.queued
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Sets the fallback responder used when no reply is queued.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &SyncBatchRequest) -> SyncResult<SyncBatchResponse> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Arc::new(responder));
    }

    /// Delays every reply, simulating network latency.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Sets the connectivity state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns every request submitted so far.
    pub fn requests(&self) -> Vec<(String, SyncBatchRequest)> {
        self.requests.lock().clone()
    }

    /// Returns the number of submitted requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn submit(&self, path: &str, request: &SyncBatchRequest) -> SyncResult<SyncBatchResponse> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        self.requests
            .lock()
            .push((path.to_string(), request.clone()));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .get_mut(path)
            .and_then(|queue| queue.pop_front());
        if let Some(reply) = queued {
            return reply;
        }

        let responder = self.responder.lock().clone();
        match responder {
            Some(responder) => responder(path, request),
            None => Err(SyncError::Protocol(format!(
                "No mock response set for {}",
                path
            ))),
        }
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tillsync_protocol::BatchResults;

    #[tokio::test]
    async fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_online());

        transport.set_online(false);
        let request = SyncBatchRequest::new("seller", vec![]);
        let result = transport.submit("/sync/orders", &request).await;
        assert!(matches!(result, Err(SyncError::Offline)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn queued_replies_come_first() {
        let transport = MockTransport::new();
        transport.push_response(
            "/sync/orders",
            SyncBatchResponse::accepted(BatchResults::default()),
        );
        transport.set_responder(|_, _| Ok(SyncBatchResponse::error("fallback")));

        let request = SyncBatchRequest::new("seller", vec![]);
        let first = transport.submit("/sync/orders", &request).await.unwrap();
        assert!(first.success);

        let second = transport.submit("/sync/orders", &request).await.unwrap();
        assert_eq!(second.error.as_deref(), Some("fallback"));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn missing_reply_is_protocol_error() {
        let transport = MockTransport::new();
        let request = SyncBatchRequest::new("seller", vec![]);
        let result = transport.submit("/sync/products", &request).await;
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }
}
