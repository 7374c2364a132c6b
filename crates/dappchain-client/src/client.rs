//! # Chain Client
//!
//! Owns the request/response transport and the middleware chain.
//!
//! | Operation | Path | Middleware |
//! |-----------|------|------------|
//! | commit | write endpoint | nonce, signing |
//! | query, nonce, resolve, receipt | read endpoint | none |
//!
//! Commits are never retried. A nonce mismatch comes back as
//! [`TxRejectedError`](crate::TxRejectedError); resubmitting is the
//! caller's call.
//!
//! Every operation is cancellable by dropping its future. A commit dropped
//! before its envelope is transmitted releases the reserved nonce.

use crate::adapters::{HttpRpcTransport, WsEventSource};
use crate::dispatcher::EventDispatcher;
use crate::domain::config::ClientConfig;
use crate::domain::errors::{
    BroadcastError, ClientError, ConfigError, SubscriptionError, TransportError, TxRejectedError,
};
use crate::domain::results::{BroadcastResult, DeployResult, QueryRequest};
use crate::middleware::{
    MiddlewareChain, NoncePolicy, NonceTxMiddleware, SignedTxMiddleware, TxMiddleware, TxOutcome,
};
use crate::ports::{NodeTransport, NonceSource};
use async_trait::async_trait;
use dappchain_crypto::Signer;
use dappchain_types::{decode_message, wire, Address, DecodeError, TxEnvelope, VmType};
use prost::Message;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client for one chain.
pub struct ChainClient {
    chain_id: String,
    transport: Arc<dyn NodeTransport>,
    middleware: MiddlewareChain,
    events: Option<Arc<EventDispatcher>>,
}

/// Builder for [`ChainClient`].
pub struct ChainClientBuilder {
    chain_id: String,
    transport: Arc<dyn NodeTransport>,
    stages: Vec<Arc<dyn TxMiddleware>>,
    events: Option<Arc<EventDispatcher>>,
}

impl ChainClientBuilder {
    /// Append a middleware stage.
    pub fn middleware(mut self, stage: Arc<dyn TxMiddleware>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Attach an event dispatcher.
    pub fn events(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.events = Some(dispatcher);
        self
    }

    pub fn build(self) -> Result<ChainClient, ConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::EmptyChainId);
        }
        Ok(ChainClient {
            chain_id: self.chain_id,
            transport: self.transport,
            middleware: MiddlewareChain::new(self.stages)?,
            events: self.events,
        })
    }
}

impl ChainClient {
    /// Start building a client with no middleware.
    pub fn builder(chain_id: impl Into<String>, transport: Arc<dyn NodeTransport>) -> ChainClientBuilder {
        ChainClientBuilder {
            chain_id: chain_id.into(),
            transport,
            stages: Vec::new(),
            events: None,
        }
    }

    /// Client with the standard nonce → signing chain.
    ///
    /// The nonce stage reads sequence numbers through `transport`.
    pub fn with_signer<T: NodeTransport + 'static>(
        chain_id: impl Into<String>,
        transport: Arc<T>,
        signer: Arc<dyn Signer>,
        policy: NoncePolicy,
    ) -> ChainClientBuilder {
        let nonces: Arc<dyn NonceSource> = transport.clone();
        Self::builder(chain_id, transport)
            .middleware(Arc::new(NonceTxMiddleware::with_policy(nonces, policy)))
            .middleware(Arc::new(SignedTxMiddleware::new(signer)))
    }

    /// HTTP/WebSocket client built from `config`.
    pub fn from_config(config: &ClientConfig, signer: Arc<dyn Signer>) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = Arc::new(HttpRpcTransport::from_config(config)?);
        let events = EventDispatcher::new(
            Arc::new(WsEventSource::from_config(config)?),
            config.events.reconnect.clone(),
        );

        Self::with_signer(&config.chain_id, transport, signer, config.nonce.policy)
            .events(Arc::new(events))
            .build()
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Address controlled by the signing stage's key, if one is configured.
    pub fn signer_address(&self) -> Option<Address> {
        self.middleware
            .find::<SignedTxMiddleware>()
            .map(|signing| signing.address(&self.chain_id))
    }

    /// The event dispatcher.
    pub fn events(&self) -> Result<&Arc<EventDispatcher>, SubscriptionError> {
        self.events.as_ref().ok_or(SubscriptionError::NotConfigured)
    }

    /// Run `tx` through the middleware chain, broadcast it, and wait for
    /// the deliver-confirmation.
    pub async fn commit(&self, tx: &wire::Transaction) -> Result<BroadcastResult, ClientError> {
        let envelope = TxEnvelope::from_transaction(tx)?;
        self.commit_bytes(envelope.from(), tx.encode_to_vec()).await
    }

    /// Commit a logical envelope.
    pub async fn commit_envelope(&self, envelope: &TxEnvelope) -> Result<BroadcastResult, ClientError> {
        self.commit_bytes(envelope.from(), envelope.to_transaction().encode_to_vec())
            .await
    }

    async fn commit_bytes(
        &self,
        account: &Address,
        payload: Vec<u8>,
    ) -> Result<BroadcastResult, ClientError> {
        let (envelope, mut reservations) = self.middleware.apply(account, payload).await?;

        reservations.transmitting();
        let outcome = match self.transport.broadcast_tx_commit(&envelope).await {
            Ok(response) => response.into_result(),
            Err(TransportError::Rpc { code, message }) => {
                Err(TxRejectedError::from_rpc_error(code, message))
            }
            Err(e) => {
                reservations.settle(TxOutcome::Uncertain);
                warn!(account = %account, error = %e, "Broadcast failed");
                return Err(BroadcastError::new("commit", e).into());
            }
        };

        match outcome {
            Ok(result) => {
                reservations.settle(TxOutcome::Accepted);
                info!(account = %account, height = result.height, hash = %result.hash, "Transaction committed");
                Ok(result)
            }
            Err(rejected) => {
                reservations.settle(TxOutcome::Rejected {
                    nonce_mismatch: rejected.is_nonce_mismatch(),
                });
                warn!(
                    account = %account,
                    phase = %rejected.phase,
                    code = rejected.code,
                    log = %rejected.log,
                    "Transaction rejected"
                );
                Err(rejected.into())
            }
        }
    }

    /// Commit a method call on `contract`.
    pub async fn call(
        &self,
        caller: &Address,
        contract: &Address,
        vm: VmType,
        input: Vec<u8>,
    ) -> Result<BroadcastResult, ClientError> {
        let envelope = TxEnvelope::call(caller.clone(), contract.clone(), vm, input);
        self.commit_envelope(&envelope).await
    }

    /// Deploy `code` and return the new contract's address.
    pub async fn deploy(
        &self,
        caller: &Address,
        vm: VmType,
        code: Vec<u8>,
        name: &str,
    ) -> Result<DeployResult, ClientError> {
        let envelope = TxEnvelope::deploy(caller.clone(), vm, code, name);
        let broadcast = self.commit_envelope(&envelope).await?;

        let response: wire::DeployResponse = decode_message("DeployResponse", &broadcast.data)?;
        let contract = response.contract.as_ref().ok_or(DecodeError::MissingField {
            message: "DeployResponse",
            field: "contract",
        })?;
        let contract = Address::from_wire(contract)?;
        info!(contract = %contract, name, "Contract deployed");

        Ok(DeployResult {
            broadcast,
            contract,
            output: response.output,
        })
    }

    /// Run a read-only query. Bypasses the middleware chain.
    ///
    /// Returns `None` when the contract produced no output.
    pub async fn query(
        &self,
        contract: &Address,
        input: Vec<u8>,
        caller: &Address,
        vm: VmType,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let request = QueryRequest {
            contract: contract.clone(),
            caller: caller.clone(),
            vm,
            input,
        };
        let output = self
            .transport
            .query(&request)
            .await
            .map_err(|e| BroadcastError::new("query", e))?;
        debug!(contract = %contract, empty = output.is_none(), "Query completed");
        Ok(output.filter(|bytes| !bytes.is_empty()))
    }

    /// Last sequence number the node accepted for `account`.
    pub async fn nonce(&self, account: &Address) -> Result<u64, ClientError> {
        self.transport
            .current_nonce(account)
            .await
            .map_err(|e| BroadcastError::new("nonce", e).into())
    }

    /// Address registered under `name`, if any.
    pub async fn resolve_contract(&self, name: &str) -> Result<Option<Address>, ClientError> {
        self.transport
            .resolve(name)
            .await
            .map_err(|e| BroadcastError::new("resolve", e).into())
    }

    /// Receipt of an EVM transaction, if the node has one.
    pub async fn evm_tx_receipt(
        &self,
        tx_hash: &[u8],
    ) -> Result<Option<wire::EvmTxReceipt>, ClientError> {
        let bytes = self
            .transport
            .evm_tx_receipt(tx_hash)
            .await
            .map_err(|e| BroadcastError::new("evmtxreceipt", e))?;

        match bytes {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_message("EvmTxReceipt", &bytes)?)),
        }
    }
}

#[async_trait]
impl NonceSource for ChainClient {
    async fn current_nonce(&self, account: &Address) -> Result<u64, TransportError> {
        self.transport.current_nonce(account).await
    }
}
