//! # degdb-wire
//!
//! Wire codec for the degdb peer protocol.
//!
//! Every message exchanged between degdb peers is wrapped in an
//! [`Envelope`](envelope::Envelope), CBOR-serialized, and framed with a
//! 4-byte big-endian length prefix. The same listening port also serves
//! HTTP: [`framing::sniff`] inspects the first 4 bytes of a freshly
//! accepted stream and hands HTTP-looking connections off to an embedded
//! HTTP server, replaying the consumed bytes so the HTTP parser still
//! sees the full request line.
//!
//! ```text
//! Application
//!     |
//!     v
//! Envelope (envelope.rs)   -- CBOR body with id/response-to/gossip fields
//!     |
//!     v
//! framing.rs                -- 4-byte length prefix, or HTTP handoff
//!     |
//!     v
//! TCP stream
//! ```

pub mod cbor;
pub mod envelope;
pub mod framing;

/// Error types for wire operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// CBOR serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// CBOR deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A frame's length prefix exceeded [`framing::MAX_FRAME_SIZE`].
    #[error("packet larger than 10MB")]
    Oversize,

    /// The connection hit EOF or a read/write error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
