//! # Wire Messages
//!
//! Binary (protobuf, tag-length-value) shapes exchanged with the node.
//!
//! Field tags are part of the protocol and must never be renumbered. Every
//! envelope layer carries the next layer as opaque `bytes`, so a layer never
//! inspects what it wraps.
//!
//! ```text
//! CallTx | DeployTx ──► MessageTx ──► Transaction ──► NonceTx ──► SignedTx
//!                       (data)        (data)          (inner)     (inner)
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// ENUMERATIONS
// =============================================================================

/// Execution environment that interprets a call's opaque input.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    ::prost::Enumeration,
)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum VmType {
    /// Native Go-style plugin contracts.
    Plugin = 0,
    /// Ethereum virtual machine contracts.
    Evm = 1,
}

/// Body encoding selected by `Request.content_type` / `Request.accept`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    ::prost::Enumeration,
)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum EncodingType {
    Json = 0,
    Protobuf3 = 1,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Wire form of an account or contract address.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Address {
    #[prost(string, tag = "1")]
    pub chain_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub local: Vec<u8>,
}

// =============================================================================
// TRANSACTION ENVELOPES
// =============================================================================

/// Outermost broadcast envelope.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Transaction {
    /// Message-kind tag, see [`crate::TxKind`].
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// Call/deploy dispatch envelope.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct MessageTx {
    #[prost(message, optional, tag = "1")]
    pub to: Option<Address>,
    #[prost(message, optional, tag = "2")]
    pub from: Option<Address>,
    /// Serialized `CallTx` or `DeployTx`.
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

/// Contract deployment.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct DeployTx {
    #[prost(enumeration = "VmType", tag = "1")]
    pub vm_type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub code: Vec<u8>,
    #[prost(string, tag = "3")]
    pub name: String,
}

/// Contract method invocation.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct CallTx {
    #[prost(enumeration = "VmType", tag = "1")]
    pub vm_type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub input: Vec<u8>,
}

/// Nonce-stamped payload.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct NonceTx {
    #[prost(bytes = "vec", tag = "1")]
    pub inner: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub sequence: u64,
}

/// Signed payload. `signature` covers `inner` exactly as transmitted.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct SignedTx {
    #[prost(bytes = "vec", tag = "1")]
    pub inner: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub public_key: Vec<u8>,
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Returned in the deliver-confirmation data of a deploy.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct DeployResponse {
    #[prost(message, optional, tag = "1")]
    pub contract: Option<Address>,
    #[prost(bytes = "vec", tag = "2")]
    pub output: Vec<u8>,
}

/// Receipt of an EVM transaction.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct EvmTxReceipt {
    #[prost(int32, tag = "1")]
    pub transaction_index: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub block_hash: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub block_number: i64,
    #[prost(int32, tag = "4")]
    pub cumulative_gas_used: i32,
    #[prost(int32, tag = "5")]
    pub gas_used: i32,
    #[prost(bytes = "vec", tag = "6")]
    pub contract_address: Vec<u8>,
    #[prost(message, repeated, tag = "7")]
    pub logs: Vec<EventData>,
    #[prost(bytes = "vec", tag = "8")]
    pub logs_bloom: Vec<u8>,
    /// 1 on success, 0 on failure.
    #[prost(int32, tag = "9")]
    pub status: i32,
    #[prost(bytes = "vec", tag = "10")]
    pub tx_hash: Vec<u8>,
}

// =============================================================================
// EVENTS
// =============================================================================

/// Event notification as pushed by the node.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct EventData {
    #[prost(string, repeated, tag = "1")]
    pub topics: Vec<String>,
    #[prost(message, optional, tag = "2")]
    pub caller: Option<Address>,
    #[prost(message, optional, tag = "3")]
    pub address: Option<Address>,
    #[prost(string, tag = "4")]
    pub plugin_name: String,
    #[prost(uint64, tag = "5")]
    pub block_height: u64,
    #[prost(bytes = "vec", tag = "6")]
    pub encoded_body: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub original_request: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub tx_hash: Vec<u8>,
}

// =============================================================================
// GENERIC REQUEST / RESPONSE
// =============================================================================

/// Generic call envelope used as plugin-VM call/query input.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Request {
    #[prost(enumeration = "EncodingType", tag = "1")]
    pub content_type: i32,
    #[prost(enumeration = "EncodingType", tag = "2")]
    pub accept: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub body: Vec<u8>,
}

/// Generic result envelope returned by plugin-VM contracts.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Response {
    #[prost(enumeration = "EncodingType", tag = "1")]
    pub content_type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub body: Vec<u8>,
}

/// `Request.body` for plugin-VM method calls.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ContractMethodCall {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(bytes = "vec", tag = "2")]
    pub args: Vec<u8>,
}
