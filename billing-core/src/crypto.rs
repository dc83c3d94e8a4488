//! Cryptographic primitives for confirmation signing
//!
//! Ed25519 signatures over canonical confirmation bytes and SHA-256
//! hashing for token integrity tags.

use crate::error::{Error, Result};
use crate::types::Signature;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// An Ed25519 keypair held by a payment processor
///
/// The platform only ever sees the public half; the private key signs
/// payment confirmations on the processor side.
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Deterministic keypair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// The public half as raw bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message with this keypair
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::from_bytes(signature.to_bytes())
    }

    /// Verify a signature against this keypair's public key
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| Error::InvalidSignature)
    }
}

/// Verify a detached signature against a raw public key
///
/// Returns `false` for any failure, including a public key that does
/// not decode to a valid curve point.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &[u8; 32]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key.verify(message, &sig).is_ok()
}

/// SHA-256 of a byte slice
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
