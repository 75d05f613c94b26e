//! A single peer connection: framed send/receive plus request/response
//! correlation (spec §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use degdb_types::Peer;
use degdb_wire::envelope::{Envelope, MessageBody};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex, RwLock};

use crate::{NetworkError, Result};

/// How long a caller waits for a response before giving up (spec §5).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A duplex channel to one peer: the reader half is driven by a loop owned
/// by [`crate::server::Server`]; this struct owns the writer half and the
/// correlation table of requests awaiting a reply.
pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    correlation: Mutex<HashMap<u64, oneshot::Sender<Envelope>>>,
    peer: RwLock<Option<Peer>>,
    remote_addr: std::net::SocketAddr,
    closed: AtomicBool,
    consecutive_heartbeat_timeouts: AtomicU64,
}

impl Connection {
    pub fn new(write_half: OwnedWriteHalf, remote_addr: std::net::SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            writer: Mutex::new(write_half),
            correlation: Mutex::new(HashMap::new()),
            peer: RwLock::new(None),
            remote_addr,
            closed: AtomicBool::new(false),
            consecutive_heartbeat_timeouts: AtomicU64::new(0),
        })
    }

    /// Split a raw stream into the owned reader half (for the caller's
    /// reader loop) and a `Connection` wrapping the writer half.
    pub fn from_stream(stream: tokio::net::TcpStream, remote_addr: std::net::SocketAddr) -> (Arc<Self>, OwnedReadHalf) {
        let (read_half, write_half) = stream.into_split();
        (Self::new(write_half, remote_addr), read_half)
    }

    pub fn remote_addr(&self) -> std::net::SocketAddr {
        self.remote_addr
    }

    pub async fn peer(&self) -> Option<Peer> {
        self.peer.read().await.clone()
    }

    pub async fn set_peer(&self, peer: Peer) {
        *self.peer.write().await = Some(peer);
    }

    /// A short identifier for tracing spans: the peer id once known,
    /// otherwise the remote address.
    pub async fn pretty_id(&self) -> String {
        match self.peer().await {
            Some(p) => p.id,
            None => self.remote_addr.to_string(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reset_heartbeat_timeouts(&self) {
        self.consecutive_heartbeat_timeouts.store(0, Ordering::SeqCst);
    }

    /// Record one more heartbeat timeout and return the new count.
    pub fn record_heartbeat_timeout(&self) -> u64 {
        self.consecutive_heartbeat_timeouts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Send an envelope without expecting a correlated reply.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(NetworkError::Closed);
        }
        let mut writer = self.writer.lock().await;
        degdb_wire::framing::write_envelope(&mut *writer, envelope).await?;
        Ok(())
    }

    /// Send `body` as a request and wait up to [`REQUEST_TIMEOUT`] for the
    /// correlated reply.
    pub async fn request(&self, body: MessageBody) -> Result<Envelope> {
        let envelope = Envelope::request(body);
        let (tx, rx) = oneshot::channel();
        self.correlation.lock().await.insert(envelope.id, tx);

        if let Err(e) = self.send(&envelope).await {
            self.correlation.lock().await.remove(&envelope.id);
            return Err(e);
        }

        let result = tokio::time::timeout(REQUEST_TIMEOUT, rx).await;
        self.correlation.lock().await.remove(&envelope.id);

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(NetworkError::Closed),
            Err(_) => Err(NetworkError::Timeout),
        }
    }

    /// Send `body` as the response to `orig` (sets `response_to`).
    pub async fn respond_to(&self, orig: &Envelope, body: MessageBody) -> Result<()> {
        let response = orig.respond_to(body);
        self.send(&response).await
    }

    /// Deliver an incoming response envelope to the caller awaiting it.
    /// Returns [`NetworkError::UnknownResponseTo`] if no one is waiting —
    /// the caller should close the connection on that error (spec §4.3).
    pub async fn deliver_response(&self, envelope: Envelope) -> Result<()> {
        let mut table = self.correlation.lock().await;
        match table.remove(&envelope.response_to) {
            Some(slot) => {
                let _ = slot.send(envelope);
                Ok(())
            }
            None => Err(NetworkError::UnknownResponseTo(envelope.response_to)),
        }
    }

    /// Close the connection: set the closed flag first so heartbeat loops
    /// observe it before the underlying stream actually goes away (spec §4.3).
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
