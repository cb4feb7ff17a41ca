//! The Monitor: single writer of the SlotMap, single-writer actor serialized
//! behind a worker thread with a bounded mailbox. Concurrent refresh
//! requests carrying the same topology version are coalesced for free by
//! mailbox ordering: while the worker is busy refreshing for version V,
//! every other request for V queues behind it; by the time the worker
//! dequeues them the version has already moved past V (or the refresh
//! failed and it is still V, in which case retrying costs nothing but one
//! more seed-node round trip).

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::ClusterConfig;
use crate::pool::PoolRegistry;
use crate::slot_map::{Node, SlotCache, SlotMap, SlotRange, TopologyVersion};

struct RefreshRequest {
    seen_version: TopologyVersion,
    reply: mpsc::Sender<TopologyVersion>,
}

/// Handle to the Monitor's worker thread.
pub struct Monitor {
    tx: mpsc::Sender<RefreshRequest>,
}

impl Monitor {
    pub fn spawn(config: ClusterConfig, slot_cache: SlotCache, registry: Arc<PoolRegistry>) -> Self {
        let (tx, rx) = mpsc::channel::<RefreshRequest>();
        thread::Builder::new()
            .name("cluster-monitor".to_string())
            .spawn(move || Self::run(rx, config, slot_cache, registry))
            .expect("failed to spawn cluster monitor thread");
        Monitor { tx }
    }

    /// Request a refresh against the topology version the caller observed.
    /// Blocks until the Monitor has either performed that refresh or
    /// determined someone else already has, returning the version in effect
    /// afterwards. Returns `seen_version` unchanged if the Monitor thread has
    /// gone away.
    pub fn refresh_mapping(&self, seen_version: TopologyVersion) -> TopologyVersion {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .tx
            .send(RefreshRequest {
                seen_version,
                reply: reply_tx,
            })
            .is_err()
        {
            return seen_version;
        }
        reply_rx.recv().unwrap_or(seen_version)
    }

    fn run(
        rx: mpsc::Receiver<RefreshRequest>,
        config: ClusterConfig,
        slot_cache: SlotCache,
        registry: Arc<PoolRegistry>,
    ) {
        while let Ok(request) = rx.recv() {
            let current = slot_cache.version();
            if request.seen_version != current {
                // Someone else already refreshed past the version this
                // caller observed; nothing to do.
                let _ = request.reply.send(current);
                continue;
            }

            match Self::do_refresh(&config, &registry) {
                Ok(ranges) => match SlotMap::from_ranges(current + 1, ranges) {
                    Ok(map) => {
                        let new_version = map.version;
                        slot_cache.store(map);
                        log::info!("cluster topology refreshed to version {new_version}");
                        let _ = request.reply.send(new_version);
                    }
                    Err(err) => {
                        log::error!("cluster topology refresh produced an invalid slot map: {err}");
                        let _ = request.reply.send(current);
                    }
                },
                Err(err) => {
                    log::error!("cluster topology refresh failed: {err}");
                    let _ = request.reply.send(current);
                }
            }
        }
    }

    fn do_refresh(config: &ClusterConfig, registry: &PoolRegistry) -> redis::RedisResult<Vec<SlotRange>> {
        let mut last_err = None;
        for seed in &config.cluster_nodes {
            match Self::query_seed(seed, config.socket_opts.connect_timeout) {
                Ok(ranges) => {
                    for range in &ranges {
                        registry.new_pool(&range.node.host, range.node.port);
                    }
                    return Ok(ranges);
                }
                Err(err) => {
                    log::warn!("seed node {}:{} unreachable: {err}", seed.host, seed.port);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            redis::RedisError::from((redis::ErrorKind::IoError, "no seed nodes configured"))
        }))
    }

    fn query_seed(
        seed: &crate::config::SeedNode,
        timeout: Duration,
    ) -> redis::RedisResult<Vec<SlotRange>> {
        let url = format!("redis://{}:{}/", seed.host, seed.port);
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection_with_timeout(timeout)?;
        let value: redis::Value = redis::cmd("CLUSTER").arg("SLOTS").query(&mut conn)?;
        parse_cluster_slots(&value)
    }
}

fn parse_cluster_slots(value: &redis::Value) -> redis::RedisResult<Vec<SlotRange>> {
    let items = match value {
        redis::Value::Bulk(items) => items,
        _ => {
            return Err(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "unexpected CLUSTER SLOTS reply shape",
            )))
        }
    };

    let mut ranges = Vec::with_capacity(items.len());
    for item in items {
        let entry = match item {
            redis::Value::Bulk(entry) if entry.len() >= 3 => entry,
            _ => continue,
        };

        let start = match entry[0] {
            redis::Value::Int(n) => n as u16,
            _ => continue,
        };
        let end = match entry[1] {
            redis::Value::Int(n) => n as u16,
            _ => continue,
        };

        let master = match &entry[2] {
            redis::Value::Bulk(node) if node.len() >= 2 => node,
            _ => continue,
        };
        let host = match &master[0] {
            redis::Value::Data(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            _ => continue,
        };
        let port = match master[1] {
            redis::Value::Int(p) => p as u16,
            _ => continue,
        };

        let pool = crate::pool::PoolName::new(&host, port);
        ranges.push(SlotRange {
            start,
            end,
            node: Node { host, port, pool },
        });
    }

    Ok(ranges)
}
