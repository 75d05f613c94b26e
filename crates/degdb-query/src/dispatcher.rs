//! Query execution: step chaining, hash sharding, and rooted/unrooted
//! fan-out to peers (spec §4.7).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use degdb_crypto::hashing::hash_str;
use degdb_network::server::{QueryHandler, Server};
use degdb_store::TripleStore;
use degdb_types::{ArrayOp, OpMode, QueryRequest, QueryType, Triple, TripleTemplate};
use degdb_wire::envelope::MessageBody;

use crate::{QueryError, Result};

/// How long an unrooted fan-out waits for any one peer (spec §4.7).
const PEER_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Implements [`QueryHandler`] so `degdb-network::Server` can answer
/// incoming `QueryRequest` envelopes without depending on this crate.
pub struct Dispatcher;

impl QueryHandler for Dispatcher {
    fn handle<'a>(
        &'a self,
        server: &'a Server,
        req: QueryRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<Triple>, String>> + Send + 'a>> {
        Box::pin(async move { execute(server, req).await.map_err(|e| e.to_string()) })
    }
}

/// Run a `QueryRequest` to completion: walk its steps in order, chaining
/// each step's results into the next via a synthetic `subj = prev.obj`
/// filter, sharding and fanning out to peers as needed.
pub async fn execute(server: &Server, req: QueryRequest) -> Result<Vec<Triple>> {
    if req.query_type != QueryType::Basic {
        return Err(QueryError::NotImplemented);
    }

    let mut results: Vec<Triple> = Vec::new();
    for (i, step) in req.steps.iter().enumerate() {
        let step = if i == 0 { step.clone() } else { chain_step(step, &results) };

        if req.sharded {
            return Ok(server.store.query_expression(&step, req.limit)?);
        }

        let shards = shard_by_hash(&step);
        if shards.len() == 1 && shards.contains_key(&0) {
            // Unrooted: the step didn't hash-shard to any single peer, so it
            // fanned out across the covering set. Return its aggregate
            // directly — no further step chaining in the unrooted path.
            return Ok(execute_unrooted(server, &shards[&0], req.limit).await?);
        }
        results = execute_rooted(server, &shards, req.limit).await?;
    }
    Ok(results)
}

/// Wrap `step` behind a synthetic AND whose flat `triples` are
/// `{subj: t.obj}` for every triple the prior step produced — "follow the
/// edge" from spec §4.7.
fn chain_step(step: &ArrayOp, prior_results: &[Triple]) -> ArrayOp {
    let mid_triples = prior_results
        .iter()
        .map(|t| TripleTemplate::with_subj(t.obj.clone()))
        .collect();
    ArrayOp {
        mode: Some(OpMode::And),
        triples: mid_triples,
        children: vec![step.clone()],
    }
}

/// Shard a step by subject hash. When every template in an OR step names
/// a subject, the step is sharded per-subject-hash; otherwise it can't be
/// pinned to any shard and is returned keyed by 0 ("unrooted").
fn shard_by_hash(step: &ArrayOp) -> HashMap<u64, ArrayOp> {
    if step.mode == Some(OpMode::Or) && step.all_templates_have_subj() {
        let mut shards = HashMap::new();
        for template in &step.triples {
            // `all_templates_have_subj` guarantees this is populated.
            let subj = template.subj.as_deref().unwrap_or_default();
            shards.insert(hash_str(subj), step.clone());
        }
        return shards;
    }
    let mut shards = HashMap::new();
    shards.insert(0, step.clone());
    shards
}

fn sharded_request(step: ArrayOp, limit: i64) -> QueryRequest {
    QueryRequest {
        query_type: QueryType::Basic,
        steps: vec![step],
        limit,
        sharded: true,
    }
}

/// Full-ring target used to compute a peer covering set for unrooted
/// steps — a query with no subject hint must fan out everywhere.
fn full_ring() -> degdb_keyspace::Keyspace {
    degdb_keyspace::Keyspace::new(0, u64::MAX)
}

async fn execute_unrooted(server: &Server, step: &ArrayOp, limit: i64) -> Result<Vec<Triple>> {
    let peers = server.peers().await;
    let target = full_ring();
    let arcs: Vec<degdb_keyspace::Keyspace> = peers
        .iter()
        .map(|(p, _)| p.arc(hash_str(&p.id)))
        .collect();
    let covering = degdb_keyspace::select_covering_set(target, &arcs);

    let request = sharded_request(step.clone(), limit);
    let mut handles = Vec::with_capacity(covering.len());
    for idx in covering {
        let (_, conn) = peers[idx].clone();
        let body = MessageBody::QueryRequest(request.clone());
        handles.push(tokio::spawn(async move {
            tokio::time::timeout(PEER_QUERY_TIMEOUT, conn.request(body)).await
        }));
    }

    let mut triples = Vec::new();
    let mut last_err: Option<QueryError> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(Ok(envelope))) => match envelope.body {
                MessageBody::QueryResponse { triples: t, error: None } => triples.extend(t),
                MessageBody::QueryResponse { error: Some(e), .. } => last_err = Some(QueryError::Remote(e)),
                _ => {}
            },
            Ok(Ok(Err(e))) => last_err = Some(e.into()),
            Ok(Err(_)) => last_err = Some(QueryError::Network(degdb_network::NetworkError::Timeout)),
            Err(e) => tracing::warn!(error = %e, "query fan-out task panicked"),
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => Ok(triples),
    }
}

async fn execute_rooted(server: &Server, shards: &HashMap<u64, ArrayOp>, limit: i64) -> Result<Vec<Triple>> {
    let local_arc = server.local_peer.arc(server.local_id_hash());
    let mut triples = Vec::new();

    for (hash, sub_step) in shards {
        if *hash == 0 {
            return Err(QueryError::Unrooted);
        }
        if local_arc.includes(*hash) {
            triples.extend(server.store.query_expression(sub_step, limit)?);
            continue;
        }

        let peers = server.peers().await;
        let target = peers.into_iter().find(|(p, _)| p.arc(hash_str(&p.id)).includes(*hash));
        let Some((_, conn)) = target else {
            return Err(QueryError::NoPeerForShard);
        };

        let request = sharded_request(sub_step.clone(), limit);
        let reply = conn.request(MessageBody::QueryRequest(request)).await?;
        match reply.body {
            MessageBody::QueryResponse { triples: t, error: None } => triples.extend(t),
            MessageBody::QueryResponse { error: Some(e), .. } => return Err(QueryError::Remote(e)),
            _ => {}
        }
    }
    Ok(triples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use degdb_crypto::signing::PrivateKey;
    use degdb_network::server::ServerConfig;
    use degdb_types::{OpMode, Peer, Triple};
    use std::sync::Arc;

    fn test_server(id: &str) -> Arc<Server> {
        let peer = Peer::new(id.to_string());
        let store: Arc<dyn TripleStore> = Arc::new(degdb_store::SqliteStore::new(
            degdb_store::open_memory().expect("open"),
        ));
        let key = Arc::new(PrivateKey::generate());
        Server::new(peer, store, key, ServerConfig::default())
    }

    fn triple(subj: &str, pred: &str, obj: &str) -> Triple {
        Triple {
            subj: subj.into(),
            pred: pred.into(),
            obj: obj.into(),
            ..Default::default()
        }
    }

    #[test]
    fn shard_by_hash_pins_or_step_with_all_subjects() {
        let step = ArrayOp::new(OpMode::Or, vec![TripleTemplate::with_subj("/m/02mjmr"), TripleTemplate::with_subj("/m/06w2sn5")]);
        let shards = shard_by_hash(&step);
        assert_eq!(shards.len(), 2);
        assert!(!shards.contains_key(&0));
    }

    #[test]
    fn shard_by_hash_is_unrooted_without_subjects() {
        let step = ArrayOp::new(OpMode::And, vec![TripleTemplate::default()]);
        let shards = shard_by_hash(&step);
        assert_eq!(shards.len(), 1);
        assert!(shards.contains_key(&0));
    }

    #[test]
    fn chain_step_wraps_prior_objects_as_subjects() {
        let step = ArrayOp::new(OpMode::And, vec![TripleTemplate::default()]);
        let prior = vec![triple("/m/02mjmr", "/people/person/name", "Barack Obama")];
        let chained = chain_step(&step, &prior);
        assert_eq!(chained.mode, Some(OpMode::And));
        assert_eq!(chained.triples[0].subj.as_deref(), Some("Barack Obama"));
        assert_eq!(chained.children.len(), 1);
    }

    #[tokio::test]
    async fn single_node_rooted_query_reads_local_storage() {
        // A centered arc always includes its own center hash, so using
        // the server's own id as the triple's subject guarantees the
        // local arc covers it regardless of how murmur3 happens to hash
        // this particular string.
        let server = test_server("127.0.0.1:4100");
        let subj = server.local_peer.id.clone();
        server
            .store
            .insert(&[triple(&subj, "/people/person/name", "Barack Obama")])
            .expect("insert");

        let req = QueryRequest {
            query_type: QueryType::Basic,
            steps: vec![ArrayOp::new(OpMode::Or, vec![TripleTemplate::with_subj(subj)])],
            limit: 10,
            sharded: false,
        };
        let result = execute(&server, req).await.expect("execute");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].obj, "Barack Obama");
    }

    #[tokio::test]
    async fn sharded_request_executes_directly_against_local_storage() {
        let server = test_server("127.0.0.1:4101");
        server
            .store
            .insert(&[triple("/m/02mjmr", "/people/person/name", "Barack Obama")])
            .expect("insert");

        let req = QueryRequest {
            query_type: QueryType::Basic,
            steps: vec![ArrayOp::new(OpMode::Or, vec![TripleTemplate::with_subj("/m/02mjmr")])],
            limit: 10,
            sharded: true,
        };
        let result = execute(&server, req).await.expect("execute");
        assert_eq!(result.len(), 1);
    }
}
