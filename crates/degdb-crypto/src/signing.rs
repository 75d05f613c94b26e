//! P-256 ECDSA triple signing.
//!
//! The private key is generated on first use and persisted as DER
//! (PKCS#8) on disk with mode `0644`. Every signed triple gets its
//! `author` field set to a stable id derived from the public key before
//! the fingerprint (and therefore the signature) is computed.

use std::fs;
use std::path::Path;

use degdb_types::Triple;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};

use crate::fingerprint::fingerprint_triple;
use crate::hashing::hash64;
use crate::{CryptoError, Result};

/// A degdb node's signing identity: a P-256 keypair.
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand_core::OsRng),
        }
    }

    /// Load a PKCS#8 DER-encoded key from `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let der = fs::read(path)?;
        let signing_key = SigningKey::from_pkcs8_der(&der)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Load the key at `path`, generating and persisting a new one if it
    /// doesn't exist yet.
    pub fn read_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::read(path);
        }
        let key = Self::generate();
        key.write(path)?;
        Ok(key)
    }

    /// Persist this key as PKCS#8 DER at `path`, mode `0644`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let der = self
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        fs::write(path, der.as_bytes())?;
        set_readable_permissions(path)?;
        Ok(())
    }

    /// The verifying (public) key.
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// `"degdb:author_" + decimal(murmur3_64(DER(public key)))`.
    pub fn author_id(&self) -> Result<String> {
        let spki = self
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let hash = hash64(spki.as_bytes());
        Ok(format!("degdb:author_{hash}"))
    }

    /// Sign `triple` in place: sets `author`, then `sig = r || s` over the
    /// fingerprint of the triple with `author` already populated.
    pub fn sign_triple(&self, triple: &mut Triple) -> Result<()> {
        triple.author = self.author_id()?;
        let fingerprint = fingerprint_triple(triple);
        let signature: Signature = self
            .signing_key
            .sign_prehash(&fingerprint)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        triple.sig = signature.to_bytes().to_vec();
        Ok(())
    }
}

#[cfg(unix)]
fn set_readable_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o644);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_readable_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_sets_author_and_sig() {
        let key = PrivateKey::generate();
        let mut triple = Triple {
            subj: "/m/02mjmr".into(),
            pred: "/people/person/name".into(),
            obj: "Barack Obama".into(),
            ..Default::default()
        };
        key.sign_triple(&mut triple).expect("sign");
        assert!(!triple.author.is_empty());
        assert!(!triple.sig.is_empty());
    }

    #[test]
    fn author_id_is_stable() {
        let key = PrivateKey::generate();
        assert_eq!(key.author_id().unwrap(), key.author_id().unwrap());
    }

    #[test]
    fn persisted_key_reloads_to_same_author_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("degdb-4000.key");

        let key = PrivateKey::read_or_generate(&path).expect("generate");
        let author = key.author_id().expect("author id");

        let reloaded = PrivateKey::read_or_generate(&path).expect("reload");
        assert_eq!(reloaded.author_id().expect("author id"), author);
    }

    #[test]
    fn key_file_has_expected_permissions() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("degdb-4001.key");
            PrivateKey::generate().write(&path).expect("write");
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }
}
