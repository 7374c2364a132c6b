//! # DAppChain Types
//!
//! Transaction envelope model shared by the client pipeline.
//!
//! ## Layers
//!
//! | Layer | Owns | Wraps |
//! |-------|------|-------|
//! | `CallTx` / `DeployTx` | VM kind, input or code | - |
//! | `MessageTx` | sender, target | call/deploy bytes |
//! | `Transaction` | message-kind tag | `MessageTx` bytes |
//! | `NonceTx` | sequence number | `Transaction` bytes |
//! | `SignedTx` | signature, public key | `NonceTx` bytes |
//!
//! No layer looks inside the bytes it wraps.

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod address;
pub mod envelope;
pub mod errors;
pub mod event;
pub mod wire;

pub use address::{Address, LocalAddress, LOCAL_ADDRESS_LEN};
pub use envelope::{
    decode_message, root_address, stamp_nonce, vm_type_from_wire, wrap_signed, TxEnvelope,
    TxKind, TxPayload,
};
pub use errors::DecodeError;
pub use event::ChainEvent;
pub use wire::{EncodingType, VmType};
