//! A Redis-Cluster-aware client dispatch core.
//!
//! Given a Redis command or pipeline, this crate determines which cluster
//! shard owns the referenced key(s), routes the request to a pooled
//! connection for that shard, and interprets the cluster-specific
//! redirection and failure protocol (`MOVED`, `ASK`, `CLUSTERDOWN`,
//! connection loss) by refreshing topology — leaving the actual retry
//! scheduling to the caller.
//!
//! Wire framing and TCP lifecycle are delegated to [`redis`]; connection
//! pooling is delegated to `r2d2`. This crate's job is purely the routing,
//! topology-cache, and redirection logic sitting between the two.
//!
//! # Example
//! ```no_run
//! use redis_cluster_dispatch::{command, ClusterConfig, DispatchOpts, Dispatcher, SeedNode};
//!
//! let config = ClusterConfig::new(vec![
//!     SeedNode::new("127.0.0.1", 7000),
//!     SeedNode::new("127.0.0.1", 7001),
//!     SeedNode::new("127.0.0.1", 7002),
//! ]);
//! let dispatcher = Dispatcher::new(config).unwrap();
//!
//! let opts = DispatchOpts::default();
//! let _ = dispatcher.command(command(&["SET", "hello", "world"]), &opts);
//! let reply = dispatcher.command(command(&["GET", "hello"]), &opts);
//! ```

pub use redis;

mod command;
mod config;
mod dispatcher;
mod error;
mod hash;
mod key_extractor;
mod monitor;
mod pool;
pub mod retry;
mod slot_map;
#[cfg(test)]
mod test_support;

pub use command::{command, Command};
pub use config::{ClusterConfig, SeedNode, SocketOpts};
pub use dispatcher::{DispatchOpts, Dispatcher, Reply};
pub use error::DispatchError;
pub use hash::{slot_of, SLOT_COUNT};
pub use pool::PoolName;
pub use slot_map::{Node, SlotCache, SlotMap, SlotRange, TopologyVersion};
