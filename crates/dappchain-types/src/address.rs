//! # Addresses
//!
//! An [`Address`] pairs a chain identifier with a fixed-length
//! [`LocalAddress`]. Equality is structural; the text form is
//! `<chain_id>:0x<hex local>`, the form the node uses in JSON-RPC params.

use crate::errors::DecodeError;
use crate::wire;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a local address in bytes.
pub const LOCAL_ADDRESS_LEN: usize = 20;

/// Account or contract identity within one chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LocalAddress([u8; LOCAL_ADDRESS_LEN]);

impl LocalAddress {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; LOCAL_ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting any length but 20.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let arr: [u8; LOCAL_ADDRESS_LEN] =
            bytes
                .try_into()
                .map_err(|_| DecodeError::InvalidAddressLength {
                    expected: LOCAL_ADDRESS_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; LOCAL_ADDRESS_LEN] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse `0x`-prefixed (or bare) hex.
    pub fn from_hex(s: &str) -> Result<Self, DecodeError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| DecodeError::InvalidAddressString(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalAddress({})", self.to_hex())
    }
}

impl fmt::Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fully qualified account or contract address.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    chain_id: String,
    local: LocalAddress,
}

impl Address {
    /// Create an address on `chain_id`.
    pub fn new(chain_id: impl Into<String>, local: LocalAddress) -> Self {
        Self {
            chain_id: chain_id.into(),
            local,
        }
    }

    /// Chain identifier.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Local part.
    pub fn local(&self) -> &LocalAddress {
        &self.local
    }

    /// Convert to the wire message.
    pub fn to_wire(&self) -> wire::Address {
        wire::Address {
            chain_id: self.chain_id.clone(),
            local: self.local.0.to_vec(),
        }
    }

    /// Convert from the wire message, validating the local length.
    pub fn from_wire(addr: &wire::Address) -> Result<Self, DecodeError> {
        Ok(Self {
            chain_id: addr.chain_id.clone(),
            local: LocalAddress::from_slice(&addr.local)?,
        })
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.local)
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chain_id, local) = s
            .rsplit_once(':')
            .ok_or_else(|| DecodeError::InvalidAddressString(s.to_string()))?;
        if chain_id.is_empty() {
            return Err(DecodeError::InvalidAddressString(s.to_string()));
        }
        Ok(Self::new(chain_id, LocalAddress::from_hex(local)?))
    }
}

impl From<&Address> for wire::Address {
    fn from(addr: &Address) -> Self {
        addr.to_wire()
    }
}

impl TryFrom<&wire::Address> for Address {
    type Error = DecodeError;

    fn try_from(addr: &wire::Address) -> Result<Self, Self::Error> {
        Self::from_wire(addr)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
