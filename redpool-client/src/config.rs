//! Client and pool configuration.

use std::time::Duration;

/// Configuration for the gateway client, its connection pool, and its
/// background dispatch workers.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379". Hostnames are resolved once at
    /// construction time.
    pub addr: String,
    /// Maximum idle connections kept for reuse.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use). Hard upper bound; callers
    /// beyond it wait up to `acquire_timeout`.
    pub max_total: usize,
    /// How long `acquire` may block waiting for a free connection before the
    /// call fails with `ResourceExhausted`.
    pub acquire_timeout: Duration,
    /// Optional TCP read timeout for ordinary operations. Cleared while a
    /// connection is serving a subscription.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Number of background threads serving fire-and-forget work, principally
    /// subscription listen loops. Each active subscription occupies one
    /// worker for its whole lifetime, so this bounds the number of
    /// concurrent subscriptions.
    pub dispatch_workers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            max_idle: 8,
            max_total: 16,
            acquire_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
            dispatch_workers: 2,
        }
    }
}
