//! CBOR serialization helpers for the degdb wire protocol.
//!
//! This module wraps [`ciborium`] to serialize and deserialize
//! [`Envelope`](crate::envelope::Envelope)s to/from CBOR (RFC 8949).

use serde::{de::DeserializeOwned, Serialize};

use crate::WireError;

/// Serialize a value to CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| WireError::Serialization(format!("CBOR serialization failed: {e}")))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, WireError> {
    ciborium::from_reader(data)
        .map_err(|e| WireError::Deserialization(format!("CBOR deserialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrip() {
        let s = Sample {
            a: 7,
            b: "hi".into(),
        };
        let bytes = to_vec(&s).expect("serialize");
        let restored: Sample = from_slice(&bytes).expect("deserialize");
        assert_eq!(s, restored);
    }

    #[test]
    fn invalid_data_returns_error() {
        let result: Result<Sample, _> = from_slice(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_data_returns_error() {
        let result: Result<Sample, _> = from_slice(&[]);
        assert!(result.is_err());
    }
}
