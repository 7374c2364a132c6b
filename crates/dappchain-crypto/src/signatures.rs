//! # Ed25519 Signatures
//!
//! Twisted Edwards curve signatures with deterministic nonces. This is the
//! scheme the node expects inside `SignedTx`: a 32-byte public key and a
//! 64-byte signature over the `inner` bytes.

use crate::CryptoError;
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

/// Public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Secret seed length in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// Supplies a signature and public key for arbitrary bytes.
///
/// Key storage and retrieval live behind this trait; a local key pair, a
/// hardware module or a remote signing service can all implement it.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key the node verifies signatures against.
    fn public_key(&self) -> Vec<u8>;

    /// Sign `message` byte-for-byte.
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Ed25519 keypair.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret seed (32 bytes).
    pub fn from_seed(seed: [u8; SECRET_KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Create from a secret key slice.
    ///
    /// Accepts the 32-byte seed or the 64-byte `seed || public key` form
    /// that many wallets export.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; SECRET_KEY_LEN] = match bytes.len() {
            SECRET_KEY_LEN | 64 => bytes[..SECRET_KEY_LEN]
                .try_into()
                .map_err(|_| CryptoError::InvalidPrivateKey)?,
            actual => {
                return Err(CryptoError::InvalidKeyLength {
                    expected: SECRET_KEY_LEN,
                    actual,
                })
            }
        };
        let pair = Self::from_seed(seed);

        if bytes.len() == 64 && bytes[SECRET_KEY_LEN..] != pair.public_key_bytes()[..] {
            return Err(CryptoError::InvalidPrivateKey);
        }
        Ok(pair)
    }

    /// Create from a hex-encoded secret key.
    pub fn from_secret_hex(s: &str) -> Result<Self, CryptoError> {
        let raw = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let bytes = Zeroizing::new(hex::decode(raw).map_err(|_| CryptoError::InvalidPrivateKey)?);
        Self::from_secret_bytes(&bytes)
    }

    /// Get public key.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message (deterministic - no RNG needed).
    pub fn sign_bytes(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }
}

#[async_trait]
impl Signer for Ed25519KeyPair {
    fn public_key(&self) -> Vec<u8> {
        self.public_key_bytes().to_vec()
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.sign_bytes(message).to_vec())
    }
}

/// Verify an Ed25519 signature.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key: [u8; PUBLIC_KEY_LEN] =
        public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LEN,
                actual: public_key.len(),
            })?;
    let verifying_key = VerifyingKey::from_bytes(&key).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig: [u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}
