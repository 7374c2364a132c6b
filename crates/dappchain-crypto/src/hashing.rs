//! # Address Derivation
//!
//! A local address is `RIPEMD-160(SHA-256(public_key))`, which yields
//! exactly [`LOCAL_ADDRESS_LEN`] bytes.

use dappchain_types::{Address, LocalAddress, LOCAL_ADDRESS_LEN};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// SHA-256 digest.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Derive the local address owned by `public_key`.
pub fn local_address_from_public_key(public_key: &[u8]) -> LocalAddress {
    let sha = Sha256::digest(public_key);
    let digest: [u8; LOCAL_ADDRESS_LEN] = Ripemd160::digest(sha).into();
    LocalAddress::new(digest)
}

/// Derive the chain address owned by `public_key`.
pub fn address_from_public_key(chain_id: &str, public_key: &[u8]) -> Address {
    Address::new(chain_id, local_address_from_public_key(public_key))
}
