//! # Contract Facades
//!
//! Bind a contract address and a caller address to a [`ChainClient`].
//!
//! - [`PluginContract`] wraps arguments in `Request { ContractMethodCall }`
//!   with JSON or protobuf bodies.
//! - [`EvmContract`] sends ABI-encoded input produced by an external
//!   [`AbiCodec`].
//!
//! "Call" commits a state-mutating transaction; "static call" runs a
//! read-only query. Events are forwarded filtered to the bound address.

use crate::client::ChainClient;
use crate::dispatcher::{EventListener, ListenerGuard};
use crate::domain::errors::{AbiError, ClientError};
use crate::domain::results::BroadcastResult;
use dappchain_types::{decode_message, wire, Address, EncodingType, VmType};
use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// VM-specific argument and result encoding, supplied by the caller.
pub trait AbiCodec: Send + Sync {
    /// Encode a call to `method` with `args`.
    fn encode_call(&self, method: &str, args: &[Value]) -> Result<Vec<u8>, AbiError>;

    /// Decode the output of `method`.
    fn decode_output(&self, method: &str, output: &[u8]) -> Result<Value, AbiError>;
}

#[derive(Clone)]
struct Binding {
    client: Arc<ChainClient>,
    address: Address,
    caller: Address,
}

impl Binding {
    async fn call(&self, vm: VmType, input: Vec<u8>) -> Result<BroadcastResult, ClientError> {
        self.client.call(&self.caller, &self.address, vm, input).await
    }

    async fn query(&self, vm: VmType, input: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError> {
        self.client
            .query(&self.address, input, &self.caller, vm)
            .await
    }

    async fn on_event(&self, listener: Arc<dyn EventListener>) -> Result<ListenerGuard, ClientError> {
        let guard = self
            .client
            .events()?
            .subscribe(self.address.clone(), listener)
            .await?;
        Ok(guard)
    }
}

/// Facade for a plugin-VM contract.
#[derive(Clone)]
pub struct PluginContract {
    binding: Binding,
}

impl PluginContract {
    pub fn new(client: Arc<ChainClient>, address: Address, caller: Address) -> Self {
        Self {
            binding: Binding {
                client,
                address,
                caller,
            },
        }
    }

    /// Bind to the contract registered under `name`.
    pub async fn from_name(
        client: Arc<ChainClient>,
        name: &str,
        caller: Address,
    ) -> Result<Self, ClientError> {
        let address = client
            .resolve_contract(name)
            .await?
            .ok_or_else(|| ClientError::ContractNotFound(name.to_string()))?;
        Ok(Self::new(client, address, caller))
    }

    pub fn address(&self) -> &Address {
        &self.binding.address
    }

    pub fn caller(&self) -> &Address {
        &self.binding.caller
    }

    fn request(method: &str, args: Vec<u8>, encoding: EncodingType) -> Vec<u8> {
        let body = wire::ContractMethodCall {
            method: method.to_string(),
            args,
        }
        .encode_to_vec();

        wire::Request {
            content_type: encoding as i32,
            accept: encoding as i32,
            body,
        }
        .encode_to_vec()
    }

    /// Commit `method` with pre-encoded `args`.
    pub async fn call_raw(
        &self,
        method: &str,
        args: Vec<u8>,
        encoding: EncodingType,
    ) -> Result<BroadcastResult, ClientError> {
        self.binding
            .call(VmType::Plugin, Self::request(method, args, encoding))
            .await
    }

    /// Query `method` with pre-encoded `args`; returns the response body.
    pub async fn static_call_raw(
        &self,
        method: &str,
        args: Vec<u8>,
        encoding: EncodingType,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(bytes) = self
            .binding
            .query(VmType::Plugin, Self::request(method, args, encoding))
            .await?
        else {
            return Ok(None);
        };

        let response: wire::Response = decode_message("Response", &bytes)?;
        Ok((!response.body.is_empty()).then_some(response.body))
    }

    /// Commit `method` with JSON-encoded `args`.
    pub async fn call_json<A: Serialize>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<BroadcastResult, ClientError> {
        let args = serde_json::to_vec(args).map_err(|e| ClientError::Encoding(e.to_string()))?;
        self.call_raw(method, args, EncodingType::Json).await
    }

    /// Query `method` with JSON-encoded `args`, decoding a JSON result.
    pub async fn static_call_json<A: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<Option<R>, ClientError> {
        let args = serde_json::to_vec(args).map_err(|e| ClientError::Encoding(e.to_string()))?;
        let Some(body) = self.static_call_raw(method, args, EncodingType::Json).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| dappchain_types::DecodeError::InvalidEncoding(e.to_string()).into())
    }

    /// Commit `method` with protobuf-encoded `args`.
    pub async fn call_proto<A: Message>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<BroadcastResult, ClientError> {
        self.call_raw(method, args.encode_to_vec(), EncodingType::Protobuf3)
            .await
    }

    /// Query `method` with protobuf-encoded `args`, decoding a protobuf result.
    pub async fn static_call_proto<A: Message, R: Message + Default>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<Option<R>, ClientError> {
        let body = self
            .static_call_raw(method, args.encode_to_vec(), EncodingType::Protobuf3)
            .await?;
        match body {
            None => Ok(None),
            Some(body) => Ok(Some(decode_message("Response.body", &body)?)),
        }
    }

    /// Receive events emitted by this contract until the guard is dropped.
    pub async fn on_event(
        &self,
        listener: Arc<dyn EventListener>,
    ) -> Result<ListenerGuard, ClientError> {
        self.binding.on_event(listener).await
    }
}

/// Facade for an EVM contract.
#[derive(Clone)]
pub struct EvmContract {
    binding: Binding,
    codec: Option<Arc<dyn AbiCodec>>,
}

impl EvmContract {
    pub fn new(client: Arc<ChainClient>, address: Address, caller: Address) -> Self {
        Self {
            binding: Binding {
                client,
                address,
                caller,
            },
            codec: None,
        }
    }

    /// Use `codec` for [`call`](Self::call) and [`static_call`](Self::static_call).
    pub fn with_codec(mut self, codec: Arc<dyn AbiCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn address(&self) -> &Address {
        &self.binding.address
    }

    pub fn caller(&self) -> &Address {
        &self.binding.caller
    }

    fn codec(&self) -> Result<&Arc<dyn AbiCodec>, ClientError> {
        self.codec
            .as_ref()
            .ok_or_else(|| AbiError("no ABI codec configured".into()).into())
    }

    /// Commit pre-encoded ABI `input`.
    pub async fn call_raw(&self, input: Vec<u8>) -> Result<BroadcastResult, ClientError> {
        self.binding.call(VmType::Evm, input).await
    }

    /// Query with pre-encoded ABI `input`.
    pub async fn static_call_raw(&self, input: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError> {
        self.binding.query(VmType::Evm, input).await
    }

    /// Encode `method(args)` with the codec and commit it.
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<BroadcastResult, ClientError> {
        let input = self.codec()?.encode_call(method, args)?;
        self.call_raw(input).await
    }

    /// Encode `method(args)`, query it, and decode the output.
    pub async fn static_call(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<Option<Value>, ClientError> {
        let codec = self.codec()?;
        let input = codec.encode_call(method, args)?;
        match self.static_call_raw(input).await? {
            None => Ok(None),
            Some(output) => Ok(Some(codec.decode_output(method, &output)?)),
        }
    }

    /// Receive events emitted by this contract until the guard is dropped.
    pub async fn on_event(
        &self,
        listener: Arc<dyn EventListener>,
    ) -> Result<ListenerGuard, ClientError> {
        self.binding.on_event(listener).await
    }
}
