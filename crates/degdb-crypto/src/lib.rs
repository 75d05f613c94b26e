//! # degdb-crypto
//!
//! Cryptographic primitives for degdb triples.
//!
//! - [`hashing`] — murmur3-64 ring hashing (peer arcs, subject sharding, author ids)
//! - [`fingerprint`] — canonical SHA-1 fingerprint of a triple
//! - [`signing`] — P-256 ECDSA signing key, generation/load/persist, `SignTriple`

pub mod fingerprint;
pub mod hashing;
pub mod signing;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Signing operation failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The on-disk key file is not a valid DER-encoded P-256 key.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// I/O error reading or writing the key file.
    #[error("key I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
