//! Seller/session context resolution.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Source of the seller identifier sent with every batch.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the locally cached seller id, if any.
    fn cached_seller(&self) -> Option<String>;

    /// Resolves the seller id through the external session service.
    async fn fetch_seller(&self) -> SyncResult<Option<String>>;
}

/// A provider that always returns the same seller.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    seller: Option<String>,
}

impl StaticSession {
    /// Creates a provider for `seller`.
    pub fn new(seller: impl Into<String>) -> Self {
        Self {
            seller: Some(seller.into()),
        }
    }

    /// Creates a provider with no seller.
    pub fn none() -> Self {
        Self { seller: None }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    fn cached_seller(&self) -> Option<String> {
        self.seller.clone()
    }

    async fn fetch_seller(&self) -> SyncResult<Option<String>> {
        Ok(self.seller.clone())
    }
}

/// Resolves the seller once and reuses it.
pub struct SessionContext {
    provider: Arc<dyn SessionProvider>,
    resolved: RwLock<Option<String>>,
}

impl SessionContext {
    /// Creates a context over `provider`.
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            provider,
            resolved: RwLock::new(None),
        }
    }

    /// Returns the seller id, fetching it on first use.
    pub async fn resolve(&self) -> SyncResult<String> {
        let cached = self.resolved.read().clone();
        if let Some(seller) = cached {
            return Ok(seller);
        }

        // A blank seller is as good as none.
        let seller = match self.provider.cached_seller().filter(|s| !s.is_empty()) {
            Some(seller) => seller,
            None => {
                debug!("no cached seller context, fetching");
                self.provider
                    .fetch_seller()
                    .await?
                    .filter(|s| !s.is_empty())
                    .ok_or(SyncError::MissingSession)?
            }
        };

        *self.resolved.write() = Some(seller.clone());
        Ok(seller)
    }

    /// Forgets the resolved seller so the next sweep resolves it again.
    pub fn invalidate(&self) {
        *self.resolved.write() = None;
    }
}
