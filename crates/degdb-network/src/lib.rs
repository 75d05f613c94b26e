//! # degdb-network
//!
//! The peer-to-peer plane: per-connection request/response correlation
//! ([`connection`]), the accept loop and peer registry with handshake and
//! heartbeat ([`server`]), insert broadcast ([`insert`]), and bloom-based
//! anti-entropy streaming ([`antientropy`]).

pub mod antientropy;
pub mod connection;
pub mod heartbeat;
pub mod insert;
pub mod server;

pub use connection::Connection;
pub use server::{Server, ServerConfig};

/// Errors surfaced by the network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] degdb_wire::WireError),

    #[error("request timed out")]
    Timeout,

    #[error("no recipients for broadcast")]
    NoRecipients,

    #[error("response to invalid request id: {0}")]
    UnknownResponseTo(u64),

    #[error("connection is closed")]
    Closed,

    #[error("duplicate peer: {0}")]
    DuplicatePeer(String),

    #[error("store error: {0}")]
    Store(#[from] degdb_store::StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] degdb_crypto::CryptoError),

    #[error("bloom filter serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
