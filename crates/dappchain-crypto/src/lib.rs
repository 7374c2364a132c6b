//! # DAppChain Crypto
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | `SignedTx` signing and verification |
//! | `hashing` | SHA-256, RIPEMD-160 | Local address derivation |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use errors::CryptoError;
pub use hashing::{address_from_public_key, local_address_from_public_key, sha256_digest};
pub use signatures::{verify, Ed25519KeyPair, Signer, PUBLIC_KEY_LEN, SIGNATURE_LEN};
