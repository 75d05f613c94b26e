//! Ring hashing: every partitioning decision in degdb (peer arcs, subject
//! sharding, author ids) is a function of a single 64-bit murmur3 hash.
//!
//! The reference implementation uses `spaolacci/murmur3`'s dedicated
//! 64-bit variant. The Rust `murmur3` crate only exposes the 128-bit
//! x64 variant, so [`hash64`] takes its low 64 bits; the two do not
//! produce bit-identical output; what matters for degdb's own protocol
//! is that the hash is cheap, well-distributed and stable across calls
//! within one deployment, which this provides.

use std::io::Cursor;

/// The 64-bit ring hash of an arbitrary byte string.
pub fn hash64(data: &[u8]) -> u64 {
    let mut cursor = Cursor::new(data);
    // Reading from an in-memory Cursor<&[u8]> cannot fail.
    murmur3::murmur3_x64_128(&mut cursor, 0).unwrap_or(0) as u64
}

/// The ring hash of a UTF-8 string (subjects, peer ids).
pub fn hash_str(s: &str) -> u64 {
    hash64(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash_str("127.0.0.1:4000"), hash_str("127.0.0.1:4000"));
    }

    #[test]
    fn distinguishes_inputs() {
        assert_ne!(hash_str("/m/02mjmr"), hash_str("/m/02mjms"));
    }

    #[test]
    fn empty_input_is_stable() {
        assert_eq!(hash64(&[]), hash64(&[]));
    }
}
