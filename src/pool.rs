//! PoolRegistry: lazily creates and names `r2d2` connection pools, one per
//! cluster node. Pools are never torn down during a process run — an idle
//! pool for a departed endpoint is harmless.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::seq::IteratorRandom;

use crate::config::ClusterConfig;

/// A stable, derivable pool identifier: `"Pool" + host + ":" + port"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolName(String);

impl PoolName {
    pub fn new(host: &str, port: u16) -> Self {
        PoolName(format!("Pool{host}:{port}"))
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `r2d2::ManageConnection` over a plain `redis::Connection`, reconnecting
/// with the socket timeouts and backoff bounds carried in `ClusterConfig`.
pub struct RedisConnectionManager {
    connection_info: redis::ConnectionInfo,
    connect_timeout: Duration,
}

impl RedisConnectionManager {
    fn new(host: &str, port: u16, connect_timeout: Duration) -> Self {
        let connection_info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), port),
            redis: redis::RedisConnectionInfo::default(),
        };
        Self {
            connection_info,
            connect_timeout,
        }
    }
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = redis::Connection;
    type Error = redis::RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let client = redis::Client::open(self.connection_info.clone())?;
        client.get_connection_with_timeout(self.connect_timeout)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::cmd("PING").query(conn)
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_open()
    }
}

pub type Pool = r2d2::Pool<RedisConnectionManager>;

pub struct PoolRegistry {
    pools: RwLock<HashMap<PoolName, Arc<Pool>>>,
    pool_size: u32,
    pool_max_overflow: u32,
    connect_timeout: Duration,
}

impl PoolRegistry {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            pool_size: config.pool_size.max(1),
            pool_max_overflow: config.pool_max_overflow,
            connect_timeout: config.socket_opts.connect_timeout,
        }
    }

    /// Idempotently create (or return the existing) pool for `host:port`.
    ///
    /// Does not eagerly connect: `r2d2`'s unchecked builder defers the first
    /// real connection attempt to the first checkout, so a node that is
    /// momentarily unreachable (e.g. an ASK target mid-migration) does not
    /// fail registration.
    pub fn new_pool(&self, host: &str, port: u16) -> Arc<Pool> {
        let name = PoolName::new(host, port);

        if let Some(existing) = self.pools.read().unwrap().get(&name) {
            return existing.clone();
        }

        let mut pools = self.pools.write().unwrap();
        if let Some(existing) = pools.get(&name) {
            return existing.clone();
        }

        let manager = RedisConnectionManager::new(host, port, self.connect_timeout);
        let pool = Arc::new(
            r2d2::Pool::builder()
                .max_size(self.pool_size + self.pool_max_overflow)
                .connection_timeout(self.connect_timeout)
                // A connection that fails the command the Dispatcher is about
                // to send is already handled by the cluster-error/IoError
                // classification in `dispatcher::classify`; a redundant
                // r2d2-level PING on every checkout would just race that
                // classification against a one-shot redirecting server.
                .test_on_check_out(false)
                .build_unchecked(manager),
        );
        log::info!("registered connection pool {name}");
        pools.insert(name, pool.clone());
        pool
    }

    pub fn get(&self, name: &PoolName) -> Option<Arc<Pool>> {
        self.pools.read().unwrap().get(name).cloned()
    }

    /// A pool chosen at random among those currently registered, used when a
    /// command carries no routable key.
    pub fn random_pool(&self) -> Option<Arc<Pool>> {
        self.pools
            .read()
            .unwrap()
            .values()
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    pub fn pool_names(&self) -> Vec<PoolName> {
        self.pools.read().unwrap().keys().cloned().collect()
    }
}
