//! Canonical triple fingerprinting for signing.

use degdb_types::Triple;
use sha1::{Digest, Sha1};

/// The canonical byte serialization of a triple used for fingerprinting
/// and signing: `subj`, `pred`, `obj`, `lang`, `author`, `created`,
/// NUL-separated in that order. `sig` is never part of the fingerprint —
/// signing would otherwise be unable to fill it in.
pub fn canonical_bytes(t: &Triple) -> Vec<u8> {
    let mut buf = Vec::new();
    for field in [
        t.subj.as_str(),
        t.pred.as_str(),
        t.obj.as_str(),
        t.lang.as_deref().unwrap_or(""),
        t.author.as_str(),
    ] {
        buf.extend_from_slice(field.as_bytes());
        buf.push(0);
    }
    buf.extend_from_slice(&t.created.to_be_bytes());
    buf
}

/// The SHA-1 fingerprint of a triple's canonical bytes, computed with
/// `sig` conceptually empty (it isn't part of [`canonical_bytes`]).
pub fn fingerprint_triple(t: &Triple) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(canonical_bytes(t));
    hasher.finalize().into()
}
