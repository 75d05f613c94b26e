//! The message envelope exchanged between degdb peers.
//!
//! Every frame on the wire carries one [`Envelope`]: a discriminated
//! [`MessageBody`] plus correlation fields (`id`, `response_to`,
//! `response_required`) and gossip-cycle bookkeeping (`gossip`, `sent_to`).

use degdb_types::{Peer, QueryRequest, Triple};
use serde::{Deserialize, Serialize};

use crate::cbor;
use crate::WireError;

/// One variant of the degdb peer protocol. See spec §6 for the full table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Identify self; request or complete a handshake.
    Handshake { sender: Peer, response: bool },
    /// Ask a peer for the peers it knows. `-1` means "all".
    PeerRequest { limit: i32 },
    /// Deliver a peer list in reply to a `PeerRequest`.
    PeerNotify { peers: Vec<Peer> },
    /// Replicate triples to a peer whose arc covers their subject hash.
    InsertTriples { triples: Vec<Triple> },
    /// Run a (possibly sharded) query.
    QueryRequest(QueryRequest),
    /// Reply to a `QueryRequest`.
    QueryResponse {
        triples: Vec<Triple>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Ask a peer for a bloom filter of the triples it holds, optionally
    /// restricted to an arc `(start, end)` (spec §4.9).
    BloomRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arc: Option<(u64, u64)>,
    },
    /// Reply to a `BloomRequest`: `filter` is a JSON-serialized
    /// `growable_bloom_filter::GrowableBloom`, kept opaque here so the
    /// envelope doesn't depend on that crate's trait impls.
    BloomResponse { filter: Vec<u8> },
}

/// The envelope wrapping every [`MessageBody`] on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Random non-zero id, set by the sender of a request.
    pub id: u64,
    /// When non-zero, the `id` of the request this message replies to.
    #[serde(default)]
    pub response_to: u64,
    /// Whether the sender is waiting on a reply to this message.
    #[serde(default)]
    pub response_required: bool,
    /// Whether this message is a gossip broadcast subject to `sent_to` dedup.
    #[serde(default)]
    pub gossip: bool,
    /// Hashes of peer ids this gossip message has already visited.
    #[serde(default)]
    pub sent_to: Vec<u64>,
    pub body: MessageBody,
}

impl Envelope {
    /// Wrap `body` as a fire-and-forget message (`id` randomly assigned,
    /// no reply expected).
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: random_nonzero_id(),
            response_to: 0,
            response_required: false,
            gossip: false,
            sent_to: Vec::new(),
            body,
        }
    }

    /// Wrap `body` as a request awaiting a reply: assigns a random id and
    /// sets `response_required`.
    pub fn request(body: MessageBody) -> Self {
        Self {
            response_required: true,
            ..Self::new(body)
        }
    }

    /// Build the reply envelope to `self`, per the `RespondTo` helper in
    /// spec §4.3: `resp.response_to = self.id`.
    pub fn respond_to(&self, body: MessageBody) -> Self {
        Self {
            id: random_nonzero_id(),
            response_to: self.id,
            response_required: false,
            gossip: false,
            sent_to: Vec::new(),
            body,
        }
    }

    /// Whether this is a reply to an earlier request.
    pub fn is_response(&self) -> bool {
        self.response_to != 0
    }

    /// Serialize this envelope to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        cbor::to_vec(self)
    }

    /// Deserialize an envelope from CBOR bytes read off the wire.
    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        cbor::from_slice(data)
    }
}

fn random_nonzero_id() -> u64 {
    loop {
        let id: u64 = rand::random();
        if id != 0 {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_handshake() {
        let body = MessageBody::Handshake {
            sender: Peer::new("127.0.0.1:4000"),
            response: false,
        };
        let env = Envelope::request(body.clone());
        let bytes = env.to_bytes().expect("serialize");
        let restored = Envelope::from_bytes(&bytes).expect("deserialize");
        assert_eq!(restored.body, body);
        assert_eq!(restored.id, env.id);
        assert!(restored.response_required);
    }

    #[test]
    fn respond_to_sets_response_to() {
        let req = Envelope::request(MessageBody::PeerRequest { limit: -1 });
        let resp = req.respond_to(MessageBody::PeerNotify { peers: vec![] });
        assert_eq!(resp.response_to, req.id);
        assert!(resp.is_response());
    }

    #[test]
    fn ids_are_nonzero_and_distinct() {
        let a = Envelope::new(MessageBody::PeerRequest { limit: -1 });
        let b = Envelope::new(MessageBody::PeerRequest { limit: -1 });
        assert_ne!(a.id, 0);
        assert_ne!(b.id, 0);
        assert_ne!(a.id, b.id);
    }
}
