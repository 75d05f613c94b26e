//! # degdb-query
//!
//! The sharded query dispatcher (spec §4.7): compiles an `ArrayOp` step
//! tree to per-shard sub-requests, executes them against local storage
//! or the peer(s) that own the relevant arc, and chains steps together
//! by following the prior step's `obj` as the next step's `subj`.

pub mod dispatcher;

pub use dispatcher::Dispatcher;

/// Errors from query execution.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A step sharded to hash 0 with no way to pin it to a peer, and no
    /// further fallback was possible.
    #[error("query step is unrooted")]
    Unrooted,

    /// Only `Basic` queries are implemented (spec §4.7).
    #[error("query type not implemented")]
    NotImplemented,

    /// No peer's arc covered a hash this rooted step needed.
    #[error("no peer found for shard")]
    NoPeerForShard,

    /// A peer's `QueryResponse` carried an error string instead of results.
    #[error("remote query error: {0}")]
    Remote(String),

    #[error(transparent)]
    Network(#[from] degdb_network::NetworkError),

    #[error(transparent)]
    Store(#[from] degdb_store::StoreError),
}

pub type Result<T> = std::result::Result<T, QueryError>;
