//! Dispatcher: the three public entry points, the retry-free dispatch
//! algorithm, and interpretation of the cluster redirection vocabulary.

use std::sync::Arc;
use std::time::Duration;

use crate::command::{command, Command};
use crate::config::ClusterConfig;
use crate::error::DispatchError;
use crate::hash::slot_of;
use crate::key_extractor;
use crate::monitor::Monitor;
use crate::pool::{Pool, PoolRegistry};
use crate::slot_map::{SlotCache, TopologyVersion};

/// A raw Redis reply, passed through verbatim to the caller.
pub type Reply = redis::Value;

/// Per-call knobs: at minimum, a timeout. Propagated to both the pool
/// checkout and the command's read/write timeouts.
#[derive(Clone, Debug)]
pub struct DispatchOpts {
    pub timeout: Duration,
}

impl Default for DispatchOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}

/// The routing core. `Send + Sync`, fully reentrant: a `Dispatcher` holds no
/// request-scoped mutable state, so one instance is meant to be shared (an
/// `Arc<Dispatcher>`) across every request-handling thread in the process.
pub struct Dispatcher {
    config: ClusterConfig,
    slot_cache: SlotCache,
    registry: Arc<PoolRegistry>,
    monitor: Monitor,
}

impl Dispatcher {
    /// Build a Dispatcher, creating pools for every configured seed node and
    /// performing the mandatory initial topology refresh.
    pub fn new(config: ClusterConfig) -> Result<Self, DispatchError> {
        if config.cluster_nodes.is_empty() {
            return Err(DispatchError::Server(redis::RedisError::from((
                redis::ErrorKind::InvalidClientConfig,
                "cluster_nodes must not be empty",
            ))));
        }

        let registry = Arc::new(PoolRegistry::new(&config));
        for seed in &config.cluster_nodes {
            registry.new_pool(&seed.host, seed.port);
        }

        let slot_cache = SlotCache::new();
        let monitor = Monitor::spawn(config.clone(), slot_cache.clone(), Arc::clone(&registry));

        let version = monitor.refresh_mapping(0);
        if version == 0 {
            return Err(DispatchError::Server(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "initial cluster topology refresh failed: no seed node reachable",
            ))));
        }

        Ok(Self {
            config,
            slot_cache,
            registry,
            monitor,
        })
    }

    /// `command → KeyExtractor → Hash → SlotCache lookup → dispatch`.
    pub fn command(&self, cmd: Command, opts: &DispatchOpts) -> Result<Reply, DispatchError> {
        let key = key_extractor::extract(&cmd)?;
        let slot = key.as_deref().map(slot_of);
        let mut replies = self.dispatch(&[cmd], slot, opts)?;
        Ok(replies.pop().expect("single command yields one reply"))
    }

    /// Extract keys from each command, require all non-nil hashes identical,
    /// and dispatch the whole batch as one pipeline.
    pub fn pipeline(&self, cmds: Vec<Command>, opts: &DispatchOpts) -> Result<Vec<Reply>, DispatchError> {
        let slot = key_extractor::extract_all(&cmds)?;
        self.dispatch(&cmds, slot, opts)
    }

    /// Same key-coherence check as `pipeline`, but wraps the batch in
    /// `MULTI` / `EXEC` — the wrapping callers must not do themselves, which
    /// is why `pipeline` forbids a user-supplied `MULTI`.
    pub fn transaction(&self, cmds: Vec<Command>, opts: &DispatchOpts) -> Result<Vec<Reply>, DispatchError> {
        let slot = key_extractor::extract_all(&cmds)?;

        let mut wrapped = Vec::with_capacity(cmds.len() + 2);
        wrapped.push(command(&["MULTI"]));
        wrapped.extend(cmds);
        wrapped.push(command(&["EXEC"]));

        self.dispatch(&wrapped, slot, opts)
    }

    /// Read the full slot map and issue `FLUSHDB` to each unique node's
    /// pool. Best-effort: per-node failures are logged and absorbed.
    pub fn flushdb(&self) -> Result<(), DispatchError> {
        let map = self.slot_cache.get_slot_maps();
        let mut seen = std::collections::HashSet::new();

        for range in &map.ranges {
            if !seen.insert(range.node.pool.clone()) {
                continue;
            }
            let Some(pool) = self.registry.get(&range.node.pool) else {
                continue;
            };
            match pool.get_timeout(self.config.checkout_timeout()) {
                Ok(mut conn) => {
                    if let Err(err) = redis::cmd("FLUSHDB").query::<()>(&mut conn) {
                        log::warn!("flushdb failed on {}: {err}", range.node.pool);
                    }
                }
                Err(err) => log::warn!("checkout failed for {}: {err}", range.node.pool),
            }
        }

        Ok(())
    }

    fn resolve_pool(&self, slot: Option<u16>) -> (TopologyVersion, Option<Arc<Pool>>) {
        match slot {
            Some(slot) => {
                let (version, pool_name) = self.slot_cache.get_pool(slot);
                let pool = pool_name.and_then(|name| self.registry.get(&name));
                (version, pool)
            }
            None => (self.slot_cache.version(), self.registry.random_pool()),
        }
    }

    fn dispatch(
        &self,
        cmds: &[Command],
        slot: Option<u16>,
        opts: &DispatchOpts,
    ) -> Result<Vec<Reply>, DispatchError> {
        let (version, pool) = self.resolve_pool(slot);
        let Some(pool) = pool else {
            self.monitor.refresh_mapping(version);
            return Err(DispatchError::Retry);
        };
        self.execute(pool, cmds, version, opts)
    }

    fn execute(
        &self,
        pool: Arc<Pool>,
        cmds: &[Command],
        version: TopologyVersion,
        opts: &DispatchOpts,
    ) -> Result<Vec<Reply>, DispatchError> {
        let mut conn = match pool.get_timeout(opts.timeout) {
            Ok(conn) => conn,
            Err(err) => {
                log::warn!("pool checkout failed: {err}");
                self.monitor.refresh_mapping(version);
                return Err(DispatchError::Retry);
            }
        };
        let _ = conn.set_read_timeout(Some(opts.timeout));
        let _ = conn.set_write_timeout(Some(opts.timeout));

        match run_commands(&mut conn, cmds) {
            Ok(replies) => Ok(replies),
            Err(err) => self.classify(err, cmds, version, opts),
        }
    }

    fn classify(
        &self,
        err: redis::RedisError,
        cmds: &[Command],
        version: TopologyVersion,
        opts: &DispatchOpts,
    ) -> Result<Vec<Reply>, DispatchError> {
        match err.kind() {
            redis::ErrorKind::Ask => {
                if let Some((addr, _slot)) = err.redirect_node() {
                    if let Some((host, port)) = split_host_port(addr) {
                        log::warn!("ASK redirect for slot to {host}:{port}");
                        let pool = self.registry.new_pool(&host, port);
                        return self.execute(pool, cmds, version, opts);
                    }
                }
                log::warn!("ASK redirect with unparseable target: {err}");
                self.monitor.refresh_mapping(version);
                Err(DispatchError::Retry)
            }
            redis::ErrorKind::Moved => {
                log::warn!("MOVED: {err}");
                self.monitor.refresh_mapping(version);
                Err(DispatchError::Retry)
            }
            redis::ErrorKind::ClusterDown => {
                log::warn!("CLUSTERDOWN: {err}");
                self.monitor.refresh_mapping(version);
                Err(DispatchError::Retry)
            }
            redis::ErrorKind::IoError => {
                log::warn!("connection error: {err}");
                self.monitor.refresh_mapping(version);
                Err(DispatchError::Retry)
            }
            _ => Err(DispatchError::Server(err)),
        }
    }
}

fn split_host_port(addr: &str) -> Option<(String, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

fn run_commands(conn: &mut redis::Connection, cmds: &[Command]) -> redis::RedisResult<Vec<Reply>> {
    if let [single] = cmds {
        let reply: Reply = build_cmd(single).query(conn)?;
        return Ok(vec![reply]);
    }

    let mut pipe = redis::pipe();
    for cmd in cmds {
        pipe.add_command(build_cmd(cmd));
    }
    pipe.query::<Vec<Reply>>(conn)
}

fn build_cmd(command: &Command) -> redis::Cmd {
    let mut cmd = redis::Cmd::new();
    for arg in command {
        cmd.arg(arg.as_slice());
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedNode;
    use crate::pool::PoolName;
    use crate::slot_map::{Node, SlotMap, SlotRange};
    use crate::test_support;
    use std::sync::atomic::Ordering;

    #[test]
    fn split_host_port_parses_ask_target() {
        assert_eq!(
            split_host_port("10.0.0.9:6390"),
            Some(("10.0.0.9".to_string(), 6390))
        );
    }

    #[test]
    fn split_host_port_rejects_garbage() {
        assert_eq!(split_host_port("not-an-address"), None);
        assert_eq!(split_host_port("10.0.0.9:not-a-port"), None);
    }

    /// A Dispatcher wired to a single pool that owns every slot, without
    /// going through `Dispatcher::new`'s mandatory live initial refresh.
    fn test_dispatcher(seeds: Vec<SeedNode>, data_host: &str, data_port: u16) -> Dispatcher {
        let config = ClusterConfig::new(seeds);
        let registry = Arc::new(PoolRegistry::new(&config));
        registry.new_pool(data_host, data_port);

        let slot_cache = SlotCache::new();
        let node = Node {
            host: data_host.to_string(),
            port: data_port,
            pool: PoolName::new(data_host, data_port),
        };
        let range = SlotRange {
            start: 0,
            end: 16383,
            node,
        };
        slot_cache.store(SlotMap::from_ranges(1, vec![range]).unwrap());

        let monitor = Monitor::spawn(config.clone(), slot_cache.clone(), Arc::clone(&registry));
        Dispatcher {
            config,
            slot_cache,
            registry,
            monitor,
        }
    }

    #[test]
    fn moved_response_requests_one_refresh_and_returns_retry() {
        let data_addr = test_support::one_shot_reply(test_support::error_reply(
            "MOVED 1234 10.0.0.2:6380",
        ));
        let (data_host, data_port) = test_support::split_addr(&data_addr);

        let (seed_addr, seed_calls) =
            test_support::counting_reply(test_support::cluster_slots_reply(
                0, 16383, "10.0.0.9", 7000,
            ));
        let (seed_host, seed_port) = test_support::split_addr(&seed_addr);

        let dispatcher = test_dispatcher(
            vec![SeedNode::new(&seed_host, seed_port)],
            &data_host,
            data_port,
        );
        let opts = DispatchOpts::default();

        let result = dispatcher.command(command(&["GET", "x"]), &opts);
        assert!(matches!(result, Err(DispatchError::Retry)));
        assert_eq!(seed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.slot_cache.version(), 2);
    }

    #[test]
    fn clusterdown_response_requests_a_refresh_and_returns_retry() {
        let data_addr = test_support::one_shot_reply(test_support::error_reply(
            "CLUSTERDOWN Hash slot not served",
        ));
        let (data_host, data_port) = test_support::split_addr(&data_addr);

        let (seed_addr, seed_calls) =
            test_support::counting_reply(test_support::cluster_slots_reply(
                0, 16383, "10.0.0.9", 7000,
            ));
        let (seed_host, seed_port) = test_support::split_addr(&seed_addr);

        let dispatcher = test_dispatcher(
            vec![SeedNode::new(&seed_host, seed_port)],
            &data_host,
            data_port,
        );
        let opts = DispatchOpts::default();

        let result = dispatcher.command(command(&["GET", "x"]), &opts);
        assert!(matches!(result, Err(DispatchError::Retry)));
        assert_eq!(seed_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_closed_mid_command_requests_a_refresh_and_returns_retry() {
        let data_addr = test_support::one_shot_close();
        let (data_host, data_port) = test_support::split_addr(&data_addr);

        let (seed_addr, seed_calls) =
            test_support::counting_reply(test_support::cluster_slots_reply(
                0, 16383, "10.0.0.9", 7000,
            ));
        let (seed_host, seed_port) = test_support::split_addr(&seed_addr);

        let dispatcher = test_dispatcher(
            vec![SeedNode::new(&seed_host, seed_port)],
            &data_host,
            data_port,
        );
        let opts = DispatchOpts::default();

        let result = dispatcher.command(command(&["GET", "x"]), &opts);
        assert!(matches!(result, Err(DispatchError::Retry)));
        assert_eq!(seed_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmapped_slot_requests_a_refresh_and_returns_retry_without_touching_a_pool() {
        let config = ClusterConfig::new(vec![SeedNode::new("127.0.0.1", 1)]);
        let registry = Arc::new(PoolRegistry::new(&config));
        let slot_cache = SlotCache::new(); // version 0, nothing mapped
        let monitor = Monitor::spawn(config.clone(), slot_cache.clone(), Arc::clone(&registry));
        let dispatcher = Dispatcher {
            config,
            slot_cache,
            registry,
            monitor,
        };

        let result = dispatcher.command(command(&["GET", "x"]), &DispatchOpts::default());
        assert!(matches!(result, Err(DispatchError::Retry)));
    }

    #[test]
    fn ask_redirection_registers_a_pool_and_redispatches_exactly_once() {
        let target_addr = test_support::one_shot_reply(test_support::status_reply("OK"));
        let (target_host, target_port) = test_support::split_addr(&target_addr);

        let data_addr = test_support::one_shot_reply(test_support::error_reply(&format!(
            "ASK 1234 {target_addr}"
        )));
        let (data_host, data_port) = test_support::split_addr(&data_addr);

        // Seed nodes are never contacted on the ASK path.
        let dispatcher = test_dispatcher(vec![SeedNode::new("127.0.0.1", 1)], &data_host, data_port);
        let opts = DispatchOpts::default();

        let result = dispatcher
            .command(command(&["GET", "x"]), &opts)
            .expect("ASK redirection should be followed transparently");
        assert_eq!(result, redis::Value::Status("OK".to_string()));

        assert!(dispatcher
            .registry
            .get(&PoolName::new(&target_host, target_port))
            .is_some());
    }
}
