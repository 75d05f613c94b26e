//! Peer identity and keyspace arc ownership.

use degdb_keyspace::{peer_arc, Keyspace};
use serde::{Deserialize, Serialize};

/// A peer in the cluster, identified by its `host:port` address.
///
/// A peer's [`Keyspace`] arc is a pure function of `id` — it is recomputed
/// from `murmur3_64(id)` rather than carried over the wire, so two nodes
/// that agree on `id` always agree on the arc.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    /// Whether this peer currently accepts and serves requests.
    #[serde(default = "default_serving")]
    pub serving: bool,
}

fn default_serving() -> bool {
    true
}

impl Peer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            serving: true,
        }
    }

    /// This peer's arc on the ring, derived from `murmur3_64(id)`.
    pub fn arc(&self, id_hash: u64) -> Keyspace {
        peer_arc(id_hash)
    }
}
