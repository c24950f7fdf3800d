//! Server configuration.

use tillsync_protocol::DEFAULT_ENDPOINT_PREFIX;

/// Configuration for the reference backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Prefix every endpoint path starts with.
    pub endpoint_prefix: String,
    /// Maximum number of items in one batch.
    pub max_batch: usize,
    /// Endpoints the server accepts. Empty accepts any endpoint.
    pub endpoints: Vec<String>,
    /// First counter value used for minted remote ids.
    pub first_remote_id: u64,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            max_batch: 500,
            endpoints: Vec::new(),
            first_remote_id: 1,
        }
    }

    /// Sets the endpoint prefix.
    pub fn with_endpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    /// Restricts the server to the given endpoints.
    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the first counter value used for remote ids.
    pub fn with_first_remote_id(mut self, first: u64) -> Self {
        self.first_remote_id = first;
        self
    }

    /// Returns true if `endpoint` is served.
    pub fn accepts(&self, endpoint: &str) -> bool {
        self.endpoints.is_empty() || self.endpoints.iter().any(|e| e == endpoint)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.endpoint_prefix, "/sync/");
        assert_eq!(config.max_batch, 500);
        assert!(config.accepts("anything"));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_batch(10)
            .with_endpoints(["orders", "products"])
            .with_first_remote_id(100);

        assert_eq!(config.max_batch, 10);
        assert_eq!(config.first_remote_id, 100);
        assert!(config.accepts("orders"));
        assert!(!config.accepts("settings"));
    }
}
