//! # Transaction Envelope Model
//!
//! Fixed nesting order that turns a logical call into broadcastable bytes:
//!
//! ```text
//! CallTx/DeployTx ─► MessageTx ─► Transaction ─► (NonceTx ─►) SignedTx
//! ```
//!
//! The first three layers are assembled here from the logical inputs
//! (sender, target, VM kind, payload). The nonce and signature layers are
//! added by the middleware chain, each treating what it wraps as opaque.
//!
//! Encoding is deterministic: the same logical inputs always produce the same
//! bytes, because those bytes are what gets signed.

use crate::address::{Address, LocalAddress};
use crate::errors::DecodeError;
use crate::wire::{self, VmType};
use prost::Message;

/// `Transaction.id` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TxKind {
    /// Payload is a `MessageTx` wrapping a `DeployTx`.
    Deploy = 1,
    /// Payload is a `MessageTx` wrapping a `CallTx`.
    Call = 2,
}

impl TryFrom<u32> for TxKind {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Deploy),
            2 => Ok(Self::Call),
            other => Err(DecodeError::UnknownEnumValue {
                kind: "TxKind",
                value: i64::from(other),
            }),
        }
    }
}

/// Decode a protobuf message, naming it in the error.
pub fn decode_message<M: Message + Default>(
    name: &'static str,
    bytes: &[u8],
) -> Result<M, DecodeError> {
    M::decode(bytes).map_err(|e| DecodeError::malformed(name, e))
}

/// Convert a wire `vm_type` to [`VmType`].
pub fn vm_type_from_wire(value: i32) -> Result<VmType, DecodeError> {
    VmType::try_from(value).map_err(|_| DecodeError::UnknownEnumValue {
        kind: "VmType",
        value: i64::from(value),
    })
}

/// Address every deployment is sent to.
pub fn root_address(chain_id: impl Into<String>) -> Address {
    Address::new(chain_id, LocalAddress::default())
}

/// Innermost payload of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPayload {
    Call { vm: VmType, input: Vec<u8> },
    Deploy { vm: VmType, code: Vec<u8>, name: String },
}

impl TxPayload {
    /// Message-kind tag for this payload.
    pub fn kind(&self) -> TxKind {
        match self {
            Self::Call { .. } => TxKind::Call,
            Self::Deploy { .. } => TxKind::Deploy,
        }
    }

    /// VM that interprets this payload.
    pub fn vm(&self) -> VmType {
        match self {
            Self::Call { vm, .. } | Self::Deploy { vm, .. } => *vm,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Self::Call { vm, input } => wire::CallTx {
                vm_type: *vm as i32,
                input: input.clone(),
            }
            .encode_to_vec(),
            Self::Deploy { vm, code, name } => wire::DeployTx {
                vm_type: *vm as i32,
                code: code.clone(),
                name: name.clone(),
            }
            .encode_to_vec(),
        }
    }
}

/// Logical content of an outgoing transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEnvelope {
    from: Address,
    to: Address,
    payload: TxPayload,
}

impl TxEnvelope {
    /// Contract method invocation.
    pub fn call(from: Address, to: Address, vm: VmType, input: Vec<u8>) -> Self {
        Self {
            from,
            to,
            payload: TxPayload::Call { vm, input },
        }
    }

    /// Contract deployment, addressed to the chain's root address.
    pub fn deploy(from: Address, vm: VmType, code: Vec<u8>, name: impl Into<String>) -> Self {
        let to = root_address(from.chain_id());
        Self {
            from,
            to,
            payload: TxPayload::Deploy {
                vm,
                code,
                name: name.into(),
            },
        }
    }

    pub fn from(&self) -> &Address {
        &self.from
    }

    pub fn to(&self) -> &Address {
        &self.to
    }

    pub fn payload(&self) -> &TxPayload {
        &self.payload
    }

    pub fn kind(&self) -> TxKind {
        self.payload.kind()
    }

    /// Serialized `MessageTx`.
    pub fn message_bytes(&self) -> Vec<u8> {
        wire::MessageTx {
            to: Some(self.to.to_wire()),
            from: Some(self.from.to_wire()),
            data: self.payload.encode(),
        }
        .encode_to_vec()
    }

    /// Outermost envelope, ready for the middleware chain.
    pub fn to_transaction(&self) -> wire::Transaction {
        wire::Transaction {
            id: self.kind() as u32,
            data: self.message_bytes(),
        }
    }

    /// Recover the logical content from a `Transaction`.
    pub fn from_transaction(tx: &wire::Transaction) -> Result<Self, DecodeError> {
        let kind = TxKind::try_from(tx.id)?;
        let msg: wire::MessageTx = decode_message("MessageTx", &tx.data)?;

        let from = msg.from.as_ref().ok_or(DecodeError::MissingField {
            message: "MessageTx",
            field: "from",
        })?;
        let to = msg.to.as_ref().ok_or(DecodeError::MissingField {
            message: "MessageTx",
            field: "to",
        })?;

        let payload = match kind {
            TxKind::Call => {
                let call: wire::CallTx = decode_message("CallTx", &msg.data)?;
                TxPayload::Call {
                    vm: vm_type_from_wire(call.vm_type)?,
                    input: call.input,
                }
            }
            TxKind::Deploy => {
                let deploy: wire::DeployTx = decode_message("DeployTx", &msg.data)?;
                TxPayload::Deploy {
                    vm: vm_type_from_wire(deploy.vm_type)?,
                    code: deploy.code,
                    name: deploy.name,
                }
            }
        };

        Ok(Self {
            from: Address::from_wire(from)?,
            to: Address::from_wire(to)?,
            payload,
        })
    }
}

/// Wrap `inner` in a `NonceTx`.
pub fn stamp_nonce(inner: Vec<u8>, sequence: u64) -> Vec<u8> {
    wire::NonceTx { inner, sequence }.encode_to_vec()
}

/// Wrap `inner` in a `SignedTx`.
pub fn wrap_signed(inner: Vec<u8>, signature: Vec<u8>, public_key: Vec<u8>) -> Vec<u8> {
    wire::SignedTx {
        inner,
        signature,
        public_key,
    }
    .encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::LOCAL_ADDRESS_LEN;
    use proptest::prelude::*;

    fn addr(byte: u8) -> Address {
        Address::new("default", LocalAddress::new([byte; LOCAL_ADDRESS_LEN]))
    }

    #[test]
    fn test_call_envelope_roundtrip() {
        let env = TxEnvelope::call(addr(1), addr(2), VmType::Evm, vec![0xAB, 0xCD]);
        let tx = env.to_transaction();
        assert_eq!(tx.id, TxKind::Call as u32);
        assert_eq!(TxEnvelope::from_transaction(&tx).unwrap(), env);
    }

    #[test]
    fn test_deploy_targets_root_address() {
        let env = TxEnvelope::deploy(addr(1), VmType::Plugin, vec![1, 2, 3], "coin");
        assert_eq!(env.to(), &root_address("default"));

        let decoded = TxEnvelope::from_transaction(&env.to_transaction()).unwrap();
        assert_eq!(
            decoded.payload(),
            &TxPayload::Deploy {
                vm: VmType::Plugin,
                code: vec![1, 2, 3],
                name: "coin".into()
            }
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let tx = wire::Transaction { id: 9, data: vec![] };
        assert!(matches!(
            TxEnvelope::from_transaction(&tx),
            Err(DecodeError::UnknownEnumValue { kind: "TxKind", .. })
        ));
    }

    #[test]
    fn test_missing_sender_rejected() {
        let msg = wire::MessageTx {
            to: Some(addr(2).to_wire()),
            from: None,
            data: vec![],
        };
        let tx = wire::Transaction {
            id: TxKind::Call as u32,
            data: msg.encode_to_vec(),
        };
        assert_eq!(
            TxEnvelope::from_transaction(&tx),
            Err(DecodeError::MissingField {
                message: "MessageTx",
                field: "from"
            })
        );
    }

    #[test]
    fn test_nonce_and_signature_layers_are_opaque() {
        let inner = vec![0xDE, 0xAD];
        let stamped = stamp_nonce(inner.clone(), 5);
        let nonce: wire::NonceTx = decode_message("NonceTx", &stamped).unwrap();
        assert_eq!(nonce.inner, inner);
        assert_eq!(nonce.sequence, 5);

        let signed = wrap_signed(stamped.clone(), vec![1; 64], vec![2; 32]);
        let signed: wire::SignedTx = decode_message("SignedTx", &signed).unwrap();
        assert_eq!(signed.inner, stamped);
    }

    proptest! {
        #[test]
        fn prop_message_bytes_deterministic_and_roundtrip(
            from in any::<[u8; 20]>(),
            to in any::<[u8; 20]>(),
            evm in any::<bool>(),
            input in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let vm = if evm { VmType::Evm } else { VmType::Plugin };
            let build = || TxEnvelope::call(
                Address::new("default", LocalAddress::new(from)),
                Address::new("default", LocalAddress::new(to)),
                vm,
                input.clone(),
            );

            prop_assert_eq!(build().message_bytes(), build().message_bytes());

            let msg: wire::MessageTx = decode_message("MessageTx", &build().message_bytes()).unwrap();
            prop_assert_eq!(msg.from.unwrap().local, from.to_vec());
            prop_assert_eq!(msg.to.unwrap().local, to.to_vec());
            let call: wire::CallTx = decode_message("CallTx", &msg.data).unwrap();
            prop_assert_eq!(call.vm_type, vm as i32);
            prop_assert_eq!(call.input, input.clone());
        }
    }
}
