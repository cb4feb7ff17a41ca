//! Plain configuration values accepted by the core. Loading these from a
//! file, environment, or CLI flags is the embedding application's job.

use std::time::Duration;

/// A seed node used by the [`crate::monitor`] to discover cluster topology.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedNode {
    pub host: String,
    pub port: u16,
}

impl SeedNode {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Timeouts passed through to the underlying `redis` client connections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketOpts {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SocketOpts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// Configuration recognized by the dispatch core.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Seed nodes used by the Monitor for `CLUSTER SLOTS`.
    pub cluster_nodes: Vec<SeedNode>,
    /// Per-node pool size.
    pub pool_size: u32,
    /// Transient extra connections allowed above `pool_size` (0 for a hard cap).
    pub pool_max_overflow: u32,
    /// Timeouts passed through to the Redis client.
    pub socket_opts: SocketOpts,
    /// Initial reconnect backoff.
    pub backoff_initial: Duration,
    /// Reconnect backoff ceiling.
    pub backoff_max: Duration,
}

impl ClusterConfig {
    pub fn new(cluster_nodes: Vec<SeedNode>) -> Self {
        Self {
            cluster_nodes,
            pool_size: 4,
            pool_max_overflow: 0,
            socket_opts: SocketOpts::default(),
            backoff_initial: Duration::from_millis(50),
            backoff_max: Duration::from_secs(2),
        }
    }

    pub(crate) fn checkout_timeout(&self) -> Duration {
        self.socket_opts.connect_timeout
    }
}
