use thiserror::Error;

/// Errors surfaced by the dispatch core.
///
/// The core never retries on its own (beyond the bounded ASK case); `Retry`
/// tells the caller a topology refresh has already been requested and that
/// reissuing the call, possibly after a backoff, is reasonable.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A transient cluster condition was observed (MOVED, CLUSTERDOWN,
    /// connection loss, or an unmapped slot). A refresh has been requested
    /// against the topology version the failing call observed.
    #[error("transient cluster condition, retry after topology refresh")]
    Retry,

    /// A pipeline's or transaction's commands hashed to more than one slot.
    #[error("all commands in a pipeline must address the same slot")]
    KeyMustSameSlot,

    /// A pipeline whose first command is MULTI was submitted. Transactions
    /// are constructed internally by [`crate::Dispatcher::transaction`]; the
    /// pipeline entry point refuses user-supplied MULTI.
    #[error("submitted pipelines may not start with MULTI")]
    NoSupportTransaction,

    /// `info`, `config`, `shutdown`, or `slaveof` cannot be routed to a
    /// single slot and are rejected everywhere, including the single-command
    /// path.
    #[error("command cannot be routed within a cluster")]
    InvalidClusterCommand,

    /// A server-side error unrelated to cluster routing, passed through
    /// verbatim (e.g. WRONGTYPE, a syntax error).
    #[error(transparent)]
    Server(#[from] redis::RedisError),
}
