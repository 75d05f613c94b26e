//! Insert broadcast and ingestion (spec §4.8).
//!
//! A client-originated insert is signed, grouped by `murmur3_64(subj)`,
//! and gossiped to whichever peers' arcs cover each group's hash (plus
//! stored locally when the local arc covers it too). A peer receiving
//! `InsertTriples` filters out anything outside its own arc before
//! storing — the sender's arc view may be stale.

use std::collections::HashMap;
use std::sync::Arc;

use degdb_crypto::hashing::hash_str;
use degdb_crypto::signing::PrivateKey;
use degdb_types::Triple;
use degdb_wire::envelope::{Envelope, MessageBody};

use crate::server::Server;
use crate::{NetworkError, Result};

/// Sign each triple, shard by subject hash, and broadcast+store.
///
/// Returns an error only when every shard failed to reach any peer and
/// none were retained locally either; partial delivery is logged but not
/// fatal (spec §7: broadcast failures don't crash the process).
pub async fn insert(server: &Arc<Server>, triples: Vec<Triple>, key: &PrivateKey) -> Result<()> {
    let mut signed = triples;
    for t in &mut signed {
        key.sign_triple(t)?;
    }

    let mut shards: HashMap<u64, Vec<Triple>> = HashMap::new();
    for t in signed {
        shards.entry(hash_str(&t.subj)).or_default().push(t);
    }

    let local_arc = server.local_peer.arc(server.local_id_hash());
    let mut any_delivered = false;

    for (hash, group) in shards {
        if local_arc.includes(hash) {
            server.store.insert(&group)?;
            any_delivered = true;
        }

        let envelope = Envelope {
            gossip: true,
            ..Envelope::new(MessageBody::InsertTriples { triples: group })
        };
        match server.broadcast(Some(hash), envelope).await {
            Ok(()) => any_delivered = true,
            Err(NetworkError::NoRecipients) => {}
            Err(e) => tracing::warn!(error = %e, "insert broadcast failed for shard"),
        }
    }

    if any_delivered {
        Ok(())
    } else {
        Err(NetworkError::NoRecipients)
    }
}

/// Store the subset of `triples` whose subject hash falls in our own arc,
/// dropping (and logging) the rest.
pub async fn receive_insert(server: &Server, triples: Vec<Triple>) -> Result<()> {
    let local_arc = server.local_peer.arc(server.local_id_hash());
    let mut in_arc = Vec::with_capacity(triples.len());
    let mut dropped = 0usize;

    for t in triples {
        if local_arc.includes(hash_str(&t.subj)) {
            in_arc.push(t);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "dropped out-of-arc triples on insert");
    }
    if !in_arc.is_empty() {
        server.store.insert(&in_arc)?;
    }
    Ok(())
}
