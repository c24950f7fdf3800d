//! Configuration for the sync engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tillsync_protocol::DEFAULT_ENDPOINT_PREFIX;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period the scheduler waits after the last mutation.
    pub quiet_period: Duration,
    /// Timeout for one batch request.
    pub request_timeout: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// What to do with references whose target has no remote id yet.
    pub unresolved_references: UnresolvedReferencePolicy,
    /// Prefix of every endpoint path.
    pub endpoint_prefix: String,
    /// Shape of a valid backend identity.
    pub remote_id_shape: RemoteIdShape,
}

impl SyncConfig {
    /// Creates a new sync configuration with default settings.
    pub fn new() -> Self {
        Self {
            quiet_period: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            unresolved_references: UnresolvedReferencePolicy::Defer,
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            remote_id_shape: RemoteIdShape::object_id(),
        }
    }

    /// Sets the scheduler quiet period.
    pub fn with_quiet_period(mut self, period: Duration) -> Self {
        self.quiet_period = period;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the unresolved reference policy.
    pub fn with_unresolved_references(mut self, policy: UnresolvedReferencePolicy) -> Self {
        self.unresolved_references = policy;
        self
    }

    /// Sets the endpoint prefix.
    pub fn with_endpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    /// Sets the remote identity shape.
    pub fn with_remote_id_shape(mut self, shape: RemoteIdShape) -> Self {
        self.remote_id_shape = shape;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for per-record retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed attempts after which a record is no longer retried automatically.
    pub max_attempts: u32,
    /// Whether a failed batch request counts against every item's budget.
    pub charge_transport_failures: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            charge_transport_failures: true,
        }
    }

    /// Sets whether transport failures consume the retry budget.
    pub fn with_charge_transport_failures(mut self, charge: bool) -> Self {
        self.charge_transport_failures = charge;
        self
    }

    /// Returns true if `attempts` failed attempts exhaust the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Policy for foreign keys that point at records without a remote id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReferencePolicy {
    /// Null the reference and send the record anyway.
    Null,
    /// Hold the record back until its dependency has synced.
    ///
    /// References to records that no longer exist locally are still nulled.
    Defer,
}

/// Predicate deciding whether a value is a backend identity.
#[derive(Clone)]
pub struct RemoteIdShape {
    name: &'static str,
    matcher: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl RemoteIdShape {
    /// 24 hexadecimal characters, the identity format of the backend.
    pub fn object_id() -> Self {
        Self {
            name: "object-id",
            matcher: Arc::new(|value: &str| {
                value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
            }),
        }
    }

    /// A custom predicate.
    pub fn custom<F>(name: &'static str, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            matcher: Arc::new(matcher),
        }
    }

    /// Returns true if `value` is a valid backend identity.
    pub fn matches(&self, value: &str) -> bool {
        (self.matcher)(value)
    }
}

impl fmt::Debug for RemoteIdShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteIdShape").field(&self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_quiet_period(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(60))
            .with_unresolved_references(UnresolvedReferencePolicy::Null)
            .with_endpoint_prefix("/api/sync/");

        assert_eq!(config.quiet_period, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.unresolved_references, UnresolvedReferencePolicy::Null);
        assert_eq!(config.endpoint_prefix, "/api/sync/");
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.quiet_period, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.retry.charge_transport_failures);
        assert_eq!(config.unresolved_references, UnresolvedReferencePolicy::Defer);
    }

    #[test]
    fn retry_budget() {
        let retry = RetryConfig::new(3);
        assert!(!retry.is_exhausted(2));
        assert!(retry.is_exhausted(3));
        assert!(retry.is_exhausted(4));
    }

    #[test]
    fn object_id_shape() {
        let shape = RemoteIdShape::object_id();
        assert!(shape.matches("65f1c2a9b3e4d5f6a7b8c9d0"));
        assert!(!shape.matches("local_3f2a"));
        assert!(!shape.matches("65f1c2a9b3e4d5f6a7b8c9dz"));
        assert!(!shape.matches(""));
    }

    #[test]
    fn custom_shape() {
        let shape = RemoteIdShape::custom("dashed", |v| v.contains('-'));
        assert!(shape.matches("P-99"));
        assert!(!shape.matches("p1"));
        assert_eq!(format!("{:?}", shape), "RemoteIdShape(\"dashed\")");
    }
}
