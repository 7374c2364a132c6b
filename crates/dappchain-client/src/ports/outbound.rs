//! # Driven Ports (Outbound SPI)
//!
//! The node surfaces the client depends on. The HTTP and WebSocket adapters
//! implement them for a real node; tests substitute in-memory doubles.

use crate::domain::errors::{SubscriptionError, TransportError};
use crate::domain::results::{BroadcastTxResponse, QueryRequest};
use async_trait::async_trait;
use dappchain_types::Address;
use tokio::sync::mpsc;

/// Supplies the authoritative sequence number for an account.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Last sequence number the node accepted for `account` (0 if none).
    async fn current_nonce(&self, account: &Address) -> Result<u64, TransportError>;
}

/// Request/response transport to a node.
///
/// One request yields exactly one response; nothing is pushed on this path.
#[async_trait]
pub trait NodeTransport: NonceSource {
    /// Transmit an encoded `Transaction` and wait for the deliver-confirmation.
    async fn broadcast_tx_commit(&self, tx: &[u8]) -> Result<BroadcastTxResponse, TransportError>;

    /// Run a read-only contract query. `None` means the contract returned
    /// nothing.
    async fn query(&self, request: &QueryRequest) -> Result<Option<Vec<u8>>, TransportError>;

    /// Look up a contract address by registered name.
    async fn resolve(&self, name: &str) -> Result<Option<Address>, TransportError>;

    /// Fetch the encoded receipt of an EVM transaction.
    async fn evm_tx_receipt(&self, tx_hash: &[u8]) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Raw notification as received from the push endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// JSON text frame.
    Json(String),
    /// Binary `EventData` frame.
    Binary(Vec<u8>),
}

/// Receiving half of one event stream connection.
///
/// The stream ends (returns `None`) when the connection closes, possibly
/// after yielding a [`SubscriptionError`]. Dropping the receiver closes the
/// underlying connection.
pub type RawEventStream = mpsc::Receiver<Result<RawEvent, SubscriptionError>>;

/// Opens connections to the push endpoint.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open one subscription to the node's event stream.
    async fn connect(&self) -> Result<RawEventStream, SubscriptionError>;
}
