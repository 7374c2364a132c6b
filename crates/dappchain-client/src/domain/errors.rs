//! # Client Errors
//!
//! Distinguishable failure classes of the commit/query/event pipeline.
//!
//! | Error | Raised when | Transmitted? |
//! |-------|-------------|--------------|
//! | [`MiddlewareError`] | a stage failed (nonce lookup, signer) | no |
//! | [`BroadcastError`] | transport failed sending/receiving | unknown |
//! | [`TxRejectedError`] | node rejected the transaction | yes |
//! | [`DecodeError`] | bytes did not match the schema | - |
//! | [`SubscriptionError`] | event stream failed | - |
//!
//! None of these are retried automatically.

use dappchain_crypto::CryptoError;
use dappchain_types::{Address, DecodeError};
use std::fmt;
use thiserror::Error;

/// Failure reported by a transport adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the node.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The node did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// JSON-RPC level error object.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Node-provided message.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A middleware stage failed; the commit was not sent.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// Fetching the authoritative nonce failed.
    #[error("Nonce lookup failed for {account}: {source}")]
    NonceUnavailable {
        /// Account whose nonce was requested.
        account: Address,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The account's sequence number cannot be incremented further.
    #[error("Nonce overflow for {0}")]
    NonceOverflow(Address),

    /// The signer could not produce a signature.
    #[error("Signing failed: {0}")]
    Signer(#[from] CryptoError),

    /// Any other stage failure.
    #[error("Middleware stage {stage} failed: {reason}")]
    Stage {
        /// Name of the failing stage.
        stage: &'static str,
        /// Failure description.
        reason: String,
    },
}

/// Transport-level failure of a commit or query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {source}")]
pub struct BroadcastError {
    /// Operation that failed (`commit`, `query`, ...).
    pub operation: &'static str,
    /// Underlying transport failure.
    #[source]
    pub source: TransportError,
}

impl BroadcastError {
    /// Create a broadcast error for `operation`.
    pub fn new(operation: &'static str, source: TransportError) -> Self {
        Self { operation, source }
    }
}

/// Processing phase in which the node rejected a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxPhase {
    /// Admission to the mempool.
    CheckTx,
    /// Execution in a block.
    DeliverTx,
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckTx => f.write_str("CheckTx"),
            Self::DeliverTx => f.write_str("DeliverTx"),
        }
    }
}

/// Node log fragments that identify a sequence-number mismatch.
const NONCE_MISMATCH_MARKERS: [&str; 3] = [
    "sequence number does not match",
    "invalid nonce",
    "nonce mismatch",
];

/// The node accepted the request but rejected the transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Transaction rejected in {phase} (code {code}): {log}")]
pub struct TxRejectedError {
    /// Phase that rejected the transaction.
    pub phase: TxPhase,
    /// Application status code (non-zero).
    pub code: u32,
    /// Node log message.
    pub log: String,
    /// Transaction hash, when the node reported one.
    pub hash: Option<String>,
}

impl TxRejectedError {
    /// A JSON-RPC error object returned in place of a broadcast result.
    ///
    /// The node answered, so the transaction was refused at admission.
    pub fn from_rpc_error(code: i64, message: String) -> Self {
        Self {
            phase: TxPhase::CheckTx,
            code: u32::try_from(code.unsigned_abs()).unwrap_or(u32::MAX),
            log: message,
            hash: None,
        }
    }

    /// True if the node rejected the transaction's sequence number.
    pub fn is_nonce_mismatch(&self) -> bool {
        let log = self.log.to_ascii_lowercase();
        NONCE_MISMATCH_MARKERS.iter().any(|m| log.contains(m))
    }
}

/// The event stream failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Opening the stream failed.
    #[error("Event stream connect failed: {0}")]
    Connect(String),

    /// The stream dropped after being established.
    #[error("Event stream disconnected: {0}")]
    Disconnected(String),

    /// Reconnection has failed `attempts` times in a row; retries continue.
    #[error("Event stream reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Consecutive failed attempts.
        attempts: u32,
    },

    /// The client has no event source configured.
    #[error("No event source configured")]
    NotConfigured,
}

/// Invalid client configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Chain id is empty.
    #[error("chain_id cannot be empty")]
    EmptyChainId,

    /// An endpoint URL could not be parsed or has the wrong scheme.
    #[error("Invalid {name} URL {url}: {reason}")]
    InvalidUrl {
        /// Endpoint name.
        name: &'static str,
        /// Configured value.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// A timeout is zero.
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    /// A limit is out of range.
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// The signing stage is not the last stage.
    #[error("Signing stage must be the last middleware stage, found at {position} of {len}")]
    SigningNotLast {
        /// Zero-based position of the signing stage.
        position: usize,
        /// Number of stages.
        len: usize,
    },

    /// The document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Building the HTTP client failed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure reported by an ABI codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("ABI codec error: {0}")]
pub struct AbiError(pub String);

/// Any failure surfaced by the client or a contract facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// See [`MiddlewareError`].
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    /// See [`BroadcastError`].
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// See [`TxRejectedError`].
    #[error(transparent)]
    TxRejected(#[from] TxRejectedError),

    /// See [`DecodeError`].
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// See [`SubscriptionError`].
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The external ABI codec failed.
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// A call payload could not be encoded.
    #[error("Payload encoding failed: {0}")]
    Encoding(String),

    /// No contract is registered under the name.
    #[error("Contract not found: {0}")]
    ContractNotFound(String),
}

impl ClientError {
    /// True if the node rejected the transaction's sequence number.
    pub fn is_nonce_mismatch(&self) -> bool {
        matches!(self, Self::TxRejected(e) if e.is_nonce_mismatch())
    }
}
