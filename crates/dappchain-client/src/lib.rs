//! DAppChain Client - commit/query pipeline and event dispatch for a DAppChain node.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Contract facades                             │
//! │            PluginContract            EvmContract                 │
//! └───────────────┬──────────────────────────────┬───────────────────┘
//!                 │ call / static call           │ on_event
//! ┌───────────────┴──────────────┐   ┌───────────┴──────────────────┐
//! │          ChainClient         │   │       EventDispatcher         │
//! │  commit ─► Middleware Chain  │   │  refcounted listener registry │
//! │            Nonce → Signing   │   │  reconnect with backoff       │
//! │  query  ─► (no middleware)   │   │                               │
//! └───────────────┬──────────────┘   └───────────┬──────────────────┘
//!                 │ NodeTransport                │ EventSource
//! ┌───────────────┴──────────────┐   ┌───────────┴──────────────────┐
//! │   HttpRpcTransport (reqwest) │   │ WsEventSource (tungstenite)   │
//! └──────────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dappchain_client::{ChainClient, ClientConfig, EvmContract};
//! use dappchain_crypto::Ed25519KeyPair;
//!
//! let config = ClientConfig::from_toml_str(&std::fs::read_to_string("client.toml")?)?;
//! let key = Arc::new(Ed25519KeyPair::from_secret_hex(&secret)?);
//! let client = Arc::new(ChainClient::from_config(&config, key)?);
//! let caller = client.signer_address().unwrap();
//!
//! let contract = EvmContract::new(client, contract_addr, caller);
//! let result = contract.call_raw(vec![0xAB, 0xCD]).await?;
//! println!("included at {}", result.height);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod client;
pub mod contract;
pub mod dispatcher;
pub mod domain;
pub mod middleware;
pub mod ports;

pub use adapters::{HttpRpcTransport, WsEventSource};
pub use client::{ChainClient, ChainClientBuilder};
pub use contract::{AbiCodec, EvmContract, PluginContract};
pub use dispatcher::{
    DispatchStats, EventDispatcher, EventListener, ListenerGuard, SubscriptionState,
};
pub use domain::{
    AbiError, BroadcastError, BroadcastResult, BroadcastTxResponse, ClientConfig, ClientError,
    ConfigError, DeployResult, EndpointConfig, EventConfig, MiddlewareError, NonceConfig,
    QueryRequest, ReconnectConfig, SubscriptionError, TimeoutConfig, TransportError, TxPhase,
    TxPhaseResult, TxRejectedError,
};
pub use middleware::{
    MiddlewareChain, MiddlewareContext, NoncePolicy, NonceTxMiddleware, Reservations,
    SignedTxMiddleware, TxLease, TxMiddleware, TxOutcome,
};
pub use ports::{EventSource, NodeTransport, NonceSource, RawEvent, RawEventStream};

pub use dappchain_types::DecodeError;
