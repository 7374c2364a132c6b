//! # Chain Events
//!
//! Decoded form of a notification emitted by remote contract execution.
//! Events are immutable once received.

use crate::address::Address;
use crate::envelope::decode_message;
use crate::errors::DecodeError;
use crate::wire;
use prost::Message;

/// Event emitted by a contract, as delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    /// Ordered topics, as emitted.
    pub topics: Vec<String>,
    /// Emitting contract.
    pub contract: Address,
    /// Account whose transaction caused the event, if known.
    pub caller: Option<Address>,
    /// Plugin that emitted the event (empty for EVM contracts).
    pub plugin_name: String,
    /// Block the emitting transaction was included in.
    pub block_height: u64,
    /// Encoded event body.
    pub body: Vec<u8>,
    /// Hash of the emitting transaction (may be empty).
    pub tx_hash: Vec<u8>,
}

impl ChainEvent {
    /// Decode a binary `EventData` notification.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let data: wire::EventData = decode_message("EventData", bytes)?;
        Self::from_wire(&data)
    }

    /// Convert from the node's notification shape.
    pub fn from_wire(data: &wire::EventData) -> Result<Self, DecodeError> {
        let contract = data.address.as_ref().ok_or(DecodeError::MissingField {
            message: "EventData",
            field: "address",
        })?;
        let caller = data.caller.as_ref().map(Address::from_wire).transpose()?;

        Ok(Self {
            topics: data.topics.clone(),
            contract: Address::from_wire(contract)?,
            caller,
            plugin_name: data.plugin_name.clone(),
            block_height: data.block_height,
            body: data.encoded_body.clone(),
            tx_hash: data.tx_hash.clone(),
        })
    }

    /// Convert to the node's notification shape.
    pub fn to_wire(&self) -> wire::EventData {
        wire::EventData {
            topics: self.topics.clone(),
            caller: self.caller.as_ref().map(Address::to_wire),
            address: Some(self.contract.to_wire()),
            plugin_name: self.plugin_name.clone(),
            block_height: self.block_height,
            encoded_body: self.body.clone(),
            original_request: Vec::new(),
            tx_hash: self.tx_hash.clone(),
        }
    }

    /// Binary `EventData` encoding.
    pub fn encode(&self) -> Vec<u8> {
        self.to_wire().encode_to_vec()
    }

    /// True if `topic` is among this event's topics.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}
