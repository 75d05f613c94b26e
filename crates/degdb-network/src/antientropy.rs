//! Bloom-based anti-entropy (spec §4.9).
//!
//! Each node can produce a scalable bloom filter of every triple it
//! holds, optionally restricted to an arc. Repairing against a peer
//! means: fetch their filter, stream our own triples through it, and
//! push back anything they evidently don't have.

use std::sync::Arc;

use degdb_crypto::fingerprint::canonical_bytes;
use degdb_keyspace::Keyspace;
use degdb_types::Triple;
use degdb_wire::envelope::MessageBody;
use growable_bloom_filter::GrowableBloom;
use tokio::sync::mpsc;

use crate::server::Server;
use crate::{NetworkError, Result};

/// Triples are streamed to callers in batches of this size by default.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// False-positive rate for generated filters (spec §4.9).
const FALSE_POSITIVE_RATE: f64 = 1e-9;
const EXPECTED_INSERTIONS: usize = 100_000;

pub(crate) fn serialize_filter(server: &Server, arc: Option<Keyspace>) -> Result<Vec<u8>> {
    let filter = server.store.bloom_filter(arc)?;
    Ok(serde_json::to_vec(&filter)?)
}

fn deserialize_filter(bytes: &[u8]) -> Result<GrowableBloom> {
    Ok(serde_json::from_slice(bytes)?)
}

/// What repairing against one peer produced.
pub struct RepairOutcome {
    pub triples_sent: usize,
    pub batches: usize,
}

/// Fetch `peer_id`'s bloom filter and push any locally held triple
/// (optionally restricted to `arc`) it doesn't have, over an
/// `InsertTriples` gossip message per batch.
///
/// Results and per-batch errors are both reported through `results`/
/// `errors` channels rather than a single return value, since a full
/// repair run can span many batches and the caller may want to react to
/// the first error without waiting for the rest (spec §4.9: "two
/// channels, results and errors").
pub async fn repair_against_peer(
    server: &Arc<Server>,
    peer_id: &str,
    arc: Option<Keyspace>,
    batch_size: usize,
    results: mpsc::Sender<usize>,
    errors: mpsc::Sender<NetworkError>,
) -> Result<RepairOutcome> {
    let conn = {
        let peers = server.peers().await;
        peers.into_iter().find(|(p, _)| p.id == peer_id).map(|(_, c)| c)
    };
    let Some(conn) = conn else {
        return Err(NetworkError::Closed);
    };

    let wire_arc = arc.map(|k| (k.start, k.end));
    let reply = conn.request(MessageBody::BloomRequest { arc: wire_arc }).await?;
    let remote_filter = match reply.body {
        MessageBody::BloomResponse { filter } => deserialize_filter(&filter)?,
        _ => return Err(NetworkError::Closed),
    };

    let local_batches = server.store.stream_all(batch_size)?;
    let mut triples_sent = 0usize;
    let mut batches_sent = 0usize;

    for batch in local_batches {
        let missing: Vec<Triple> = batch
            .into_iter()
            .filter(|t| !remote_filter.contains(canonical_bytes(t)))
            .collect();
        if missing.is_empty() {
            continue;
        }
        let count = missing.len();
        let envelope = degdb_wire::envelope::Envelope::new(MessageBody::InsertTriples { triples: missing });
        match conn.send(&envelope).await {
            Ok(()) => {
                triples_sent += count;
                batches_sent += 1;
                let _ = results.send(count).await;
            }
            Err(e) => {
                let _ = errors.send(e).await;
            }
        }
    }

    Ok(RepairOutcome {
        triples_sent,
        batches: batches_sent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_roundtrips_through_json() {
        let mut filter = GrowableBloom::new(FALSE_POSITIVE_RATE, EXPECTED_INSERTIONS);
        filter.insert(b"hello".to_vec());
        let bytes = serde_json::to_vec(&filter).expect("serialize");
        let restored: GrowableBloom = serde_json::from_slice(&bytes).expect("deserialize");
        assert!(restored.contains(b"hello".to_vec()));
        assert!(!restored.contains(b"goodbye".to_vec()));
    }
}
