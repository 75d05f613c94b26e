//! The peer server: accept loop, HTTP handoff, peer registry, handshake,
//! and broadcast-by-hash (spec §4.4).

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use degdb_crypto::signing::PrivateKey;
use degdb_store::TripleStore;
use degdb_types::{Peer, QueryRequest, Triple};
use degdb_wire::envelope::{Envelope, MessageBody};
use degdb_wire::framing::Sniff;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

use crate::connection::Connection;
use crate::{NetworkError, Result};

/// Tunable timing constants flagged in spec.md §9 as needing configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub max_heartbeat_timeouts: u64,
    pub peer_request_limit: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(10),
            max_heartbeat_timeouts: 3,
            peer_request_limit: -1,
        }
    }
}

/// A stream whose first few bytes were already consumed by the HTTP sniff;
/// reads replay those bytes before falling through to the inner stream.
pub struct PrefixedStream {
    prefix: [u8; 4],
    prefix_pos: usize,
    inner: TcpStream,
}

impl PrefixedStream {
    fn new(prefix: [u8; 4], inner: TcpStream) -> Self {
        Self {
            prefix,
            prefix_pos: 0,
            inner,
        }
    }
}

impl AsyncRead for PrefixedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.prefix_pos < self.prefix.len() {
            let remaining = &self.prefix[self.prefix_pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.prefix_pos += n;
            return std::task::Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for PrefixedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }
    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }
    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// An HTTP-looking connection handed off for an embedded HTTP server to
/// consume (spec §4.2). `degdb-daemon` owns the receiving end.
pub struct HttpHandoff {
    pub stream: PrefixedStream,
    pub remote_addr: SocketAddr,
}

type QueryFuture<'a> = Pin<Box<dyn Future<Output = std::result::Result<Vec<Triple>, String>> + Send + 'a>>;

/// Executes (possibly sharded) queries against local storage and peers.
/// Implemented by `degdb-query` and wired in by `degdb-daemon`; kept as a
/// trait here so `degdb-network` never depends on the query crate.
pub trait QueryHandler: Send + Sync {
    fn handle<'a>(&'a self, server: &'a Server, req: QueryRequest) -> QueryFuture<'a>;
}

/// Server-wide state: local identity, peer registry, and the collaborators
/// (store, signing key, query handler) message handling delegates to.
pub struct Server {
    pub local_peer: Peer,
    local_id_hash: u64,
    pub store: Arc<dyn TripleStore>,
    signing_key: Arc<PrivateKey>,
    registry: RwLock<HashMap<String, Arc<Connection>>>,
    config: ServerConfig,
    http_tx: RwLock<Option<mpsc::Sender<HttpHandoff>>>,
    query_handler: RwLock<Option<Arc<dyn QueryHandler>>>,
}

impl Server {
    pub fn new(local_peer: Peer, store: Arc<dyn TripleStore>, signing_key: Arc<PrivateKey>, config: ServerConfig) -> Arc<Self> {
        let local_id_hash = degdb_crypto::hashing::hash_str(&local_peer.id);
        Arc::new(Self {
            local_peer,
            local_id_hash,
            store,
            signing_key,
            registry: RwLock::new(HashMap::new()),
            config,
            http_tx: RwLock::new(None),
            query_handler: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn local_id_hash(&self) -> u64 {
        self.local_id_hash
    }

    pub fn signing_key(&self) -> &PrivateKey {
        &self.signing_key
    }

    pub async fn set_http_sender(&self, tx: mpsc::Sender<HttpHandoff>) {
        *self.http_tx.write().await = Some(tx);
    }

    pub async fn set_query_handler(&self, handler: Arc<dyn QueryHandler>) {
        *self.query_handler.write().await = Some(handler);
    }

    /// All peers currently registered, as `(Peer, Connection)` pairs.
    pub async fn peers(&self) -> Vec<(Peer, Arc<Connection>)> {
        let registry = self.registry.read().await;
        let mut out = Vec::with_capacity(registry.len());
        for conn in registry.values() {
            if let Some(peer) = conn.peer().await {
                out.push((peer, conn.clone()));
            }
        }
        out
    }

    pub async fn peer_count(&self) -> usize {
        self.registry.read().await.len()
    }

    async fn register(&self, peer: Peer, conn: Arc<Connection>) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.contains_key(&peer.id) {
            return Err(NetworkError::DuplicatePeer(peer.id));
        }
        conn.set_peer(peer.clone()).await;
        registry.insert(peer.id, conn);
        Ok(())
    }

    async fn unregister(&self, peer_id: &str) {
        self.registry.write().await.remove(peer_id);
    }

    /// Remove a peer from the registry without waiting for its reader
    /// loop to notice the connection closed. Used by the heartbeat loop
    /// on eviction (spec §4.4).
    pub(crate) async fn evict(&self, peer_id: &str) {
        self.unregister(peer_id).await;
    }

    /// Bind and start accepting connections. Returns the bound address —
    /// by the time this returns, the bind has already succeeded, which is
    /// what test harnesses synchronize on (spec §4.4's `ListenWait`).
    pub async fn listen(self: &Arc<Self>, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote_addr)) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            server.accept_stream(stream, remote_addr).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept error");
                    }
                }
            }
        });
        Ok(bound)
    }

    async fn accept_stream(self: Arc<Self>, mut stream: TcpStream, remote_addr: SocketAddr) {
        let sniff = degdb_wire::framing::sniff_first_frame(&mut stream).await;
        match sniff {
            Ok(Sniff::Http { prefix }) => {
                let tx = self.http_tx.read().await.clone();
                if let Some(tx) = tx {
                    let handoff = HttpHandoff {
                        stream: PrefixedStream::new(prefix, stream),
                        remote_addr,
                    };
                    if tx.send(handoff).await.is_err() {
                        tracing::warn!("HTTP handoff channel closed, dropping connection");
                    }
                } else {
                    tracing::warn!("no HTTP listener registered, dropping HTTP-looking connection");
                }
            }
            Ok(Sniff::Message(first)) => {
                let (conn, read_half) = Connection::from_stream(stream, remote_addr);
                if !self.dispatch(&conn, first).await {
                    conn.close().await;
                    return;
                }
                self.run_reader(conn, read_half).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, %remote_addr, "error sniffing connection");
            }
        }
    }

    async fn run_reader(self: Arc<Self>, conn: Arc<Connection>, mut read_half: OwnedReadHalf) {
        loop {
            match degdb_wire::framing::read_envelope(&mut read_half).await {
                Ok(envelope) => {
                    if !self.dispatch(&conn, envelope).await {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        tracing::info!(peer = %conn.pretty_id().await, "peer connection closed");
        if let Some(peer) = conn.peer().await {
            self.unregister(&peer.id).await;
        }
        conn.close().await;
    }

    /// Route one incoming envelope. Returns `false` when the connection
    /// must be closed (spec §4.3: unknown `response_to` is a protocol
    /// violation).
    async fn dispatch(self: &Arc<Self>, conn: &Arc<Connection>, envelope: Envelope) -> bool {
        if envelope.is_response() {
            if let Err(e) = conn.deliver_response(envelope).await {
                tracing::warn!(error = %e, "closing connection after unrouteable response");
                return false;
            }
            return true;
        }

        let server = self.clone();
        let conn = conn.clone();
        tokio::spawn(async move {
            if let Err(e) = server.handle_message(&conn, envelope).await {
                tracing::warn!(error = %e, "error handling message");
            }
        });
        true
    }

    async fn handle_message(self: Arc<Self>, conn: &Arc<Connection>, envelope: Envelope) -> Result<()> {
        match &envelope.body {
            MessageBody::Handshake { sender, response } => {
                if *response {
                    // A reply handshake with response_to == 0 shouldn't
                    // normally reach here (it's routed via the correlation
                    // table); tolerate it as a no-op.
                    return Ok(());
                }
                self.handle_handshake(conn, &envelope, sender.clone()).await
            }
            MessageBody::PeerRequest { limit } => self.handle_peer_request(conn, &envelope, *limit).await,
            MessageBody::PeerNotify { peers } => self.handle_peer_notify(peers.clone()).await,
            MessageBody::InsertTriples { triples } => self.handle_insert_triples(triples.clone()).await,
            MessageBody::QueryRequest(req) => self.handle_query_request(conn, &envelope, req.clone()).await,
            MessageBody::QueryResponse { .. } => Ok(()),
            MessageBody::BloomRequest { arc } => self.handle_bloom_request(conn, &envelope, *arc).await,
            MessageBody::BloomResponse { .. } => Ok(()),
        }
    }

    async fn handle_bloom_request(&self, conn: &Arc<Connection>, orig: &Envelope, arc: Option<(u64, u64)>) -> Result<()> {
        let keyspace = arc.map(|(start, end)| degdb_keyspace::Keyspace::new(start, end));
        let filter = crate::antientropy::serialize_filter(self, keyspace)?;
        conn.respond_to(orig, MessageBody::BloomResponse { filter }).await
    }

    async fn handle_handshake(self: &Arc<Self>, conn: &Arc<Connection>, orig: &Envelope, sender: Peer) -> Result<()> {
        if self.register(sender.clone(), conn.clone()).await.is_err() {
            tracing::info!(peer = %sender.id, "duplicate handshake, closing new connection");
            conn.close().await;
            return Ok(());
        }
        conn.respond_to(
            orig,
            MessageBody::Handshake {
                sender: self.local_peer.clone(),
                response: true,
            },
        )
        .await?;

        let server = self.clone();
        let conn = conn.clone();
        tokio::spawn(async move {
            crate::heartbeat::run(server, conn).await;
        });
        Ok(())
    }

    async fn handle_peer_request(&self, conn: &Arc<Connection>, orig: &Envelope, limit: i32) -> Result<()> {
        let requester = conn.peer().await;
        let mut peers: Vec<Peer> = self
            .peers()
            .await
            .into_iter()
            .map(|(p, _)| p)
            .filter(|p| Some(p.id.as_str()) != requester.as_ref().map(|r| r.id.as_str()))
            .collect();
        if limit >= 0 {
            peers.truncate(limit as usize);
        }
        conn.respond_to(orig, MessageBody::PeerNotify { peers }).await
    }

    async fn handle_peer_notify(self: &Arc<Self>, peers: Vec<Peer>) -> Result<()> {
        for peer in peers {
            if peer.id == self.local_peer.id {
                continue;
            }
            if self.registry.read().await.contains_key(&peer.id) {
                continue;
            }
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.connect(&peer.id.clone()).await {
                    tracing::warn!(peer = %peer.id, error = %e, "failed to dial gossiped peer");
                }
            });
        }
        Ok(())
    }

    async fn handle_insert_triples(&self, triples: Vec<Triple>) -> Result<()> {
        crate::insert::receive_insert(self, triples).await
    }

    async fn handle_query_request(self: &Arc<Self>, conn: &Arc<Connection>, orig: &Envelope, req: QueryRequest) -> Result<()> {
        let handler = self.query_handler.read().await.clone();
        let response = match handler {
            Some(handler) => match handler.handle(self, req).await {
                Ok(triples) => MessageBody::QueryResponse { triples, error: None },
                Err(e) => MessageBody::QueryResponse {
                    triples: Vec::new(),
                    error: Some(e),
                },
            },
            None => MessageBody::QueryResponse {
                triples: Vec::new(),
                error: Some("query-not-implemented".to_string()),
            },
        };
        conn.respond_to(orig, response).await
    }

    /// Dial `addr`, perform the handshake, and register the resulting
    /// connection as a peer.
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<Arc<Connection>> {
        let stream = TcpStream::connect(addr).await?;
        let remote_addr = stream.peer_addr()?;
        let (conn, read_half) = Connection::from_stream(stream, remote_addr);

        let reply = conn
            .request(MessageBody::Handshake {
                sender: self.local_peer.clone(),
                response: false,
            })
            .await?;

        let sender = match reply.body {
            MessageBody::Handshake { sender, response: true } => sender,
            _ => return Err(NetworkError::Closed),
        };

        self.register(sender, conn.clone()).await?;

        let server = self.clone();
        let reader_conn = conn.clone();
        tokio::spawn(async move {
            server.run_reader(reader_conn, read_half).await;
        });

        conn.request(MessageBody::PeerRequest {
            limit: self.config.peer_request_limit,
        })
        .await?;

        let server = self.clone();
        let heartbeat_conn = conn.clone();
        tokio::spawn(async move {
            crate::heartbeat::run(server, heartbeat_conn).await;
        });

        Ok(conn)
    }

    /// Broadcast `body` to every peer whose arc includes `hash` (or every
    /// peer, if `hash` is `None`). Gossip messages skip peers already in
    /// `sent_to` and accumulate the chosen recipients into it (spec §4.4).
    pub async fn broadcast(&self, hash: Option<u64>, mut envelope: Envelope) -> Result<()> {
        let candidates = self.peers().await;
        let mut recipients: Vec<Arc<Connection>> = Vec::new();
        let mut newly_visited = Vec::new();

        for (peer, conn) in candidates {
            if let Some(h) = hash {
                if !peer.arc(degdb_crypto::hashing::hash_str(&peer.id)).includes(h) {
                    continue;
                }
            }
            let peer_hash = degdb_crypto::hashing::hash_str(&peer.id);
            if envelope.gossip && envelope.sent_to.contains(&peer_hash) {
                continue;
            }
            newly_visited.push(peer_hash);
            recipients.push(conn);
        }

        if recipients.is_empty() {
            return Err(NetworkError::NoRecipients);
        }

        if envelope.gossip {
            envelope.sent_to.extend(newly_visited);
            envelope.sent_to.push(self.local_id_hash);
        }

        for conn in recipients {
            if let Err(e) = conn.send(&envelope).await {
                tracing::warn!(error = %e, "broadcast send failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server(port_label: &str) -> Arc<Server> {
        let peer = Peer::new(format!("127.0.0.1:{port_label}"));
        let store: Arc<dyn TripleStore> = Arc::new(degdb_store::SqliteStore::new(
            degdb_store::open_memory().expect("open"),
        ));
        let key = Arc::new(PrivateKey::generate());
        Server::new(peer, store, key, ServerConfig::default())
    }

    #[tokio::test]
    async fn two_nodes_handshake_and_register_each_other() {
        let a = test_server("0");
        let b = test_server("0");

        let a_addr = a.listen("127.0.0.1:0").await.expect("listen a");
        let _b_addr = b.listen("127.0.0.1:0").await.expect("listen b");

        b.connect(&a_addr.to_string()).await.expect("connect");

        for _ in 0..20 {
            if a.peer_count().await == 1 && b.peer_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(a.peer_count().await, 1);
        assert_eq!(b.peer_count().await, 1);
    }

    #[tokio::test]
    async fn broadcast_with_no_peers_returns_no_recipients() {
        let a = test_server("0");
        let envelope = Envelope::new(MessageBody::PeerRequest { limit: -1 });
        let result = a.broadcast(None, envelope).await;
        assert!(matches!(result, Err(NetworkError::NoRecipients)));
    }
}
