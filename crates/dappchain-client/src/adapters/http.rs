//! HTTP JSON-RPC transport for the write and read endpoints.

use super::json_rpc::{
    encode_base64, parse_address_result, parse_broadcast_result, parse_bytes_result,
    parse_u64_result, JsonRpcRequest, JsonRpcResponse,
};
use crate::domain::config::{ClientConfig, EndpointConfig, TimeoutConfig};
use crate::domain::errors::{ConfigError, TransportError};
use crate::domain::results::{BroadcastTxResponse, QueryRequest};
use crate::ports::{NodeTransport, NonceSource};
use async_trait::async_trait;
use dappchain_types::Address;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Request/response transport over reqwest.
pub struct HttpRpcTransport {
    client: Client,
    write_url: Url,
    read_url: Url,
    request_id: AtomicU64,
}

impl HttpRpcTransport {
    /// Create a transport for `endpoints`.
    pub fn new(endpoints: &EndpointConfig, timeouts: &TimeoutConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeouts.request_timeout())
            .connect_timeout(timeouts.request_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            write_url: endpoints.write_url()?,
            read_url: endpoints.read_url()?,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Self::new(&config.endpoints, &config.timeouts)
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a JSON-RPC method and return its `result` member.
    async fn call<P: Serialize + Send>(
        &self,
        url: &Url,
        method: &str,
        params: P,
    ) -> Result<Value, TransportError> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(method, params, id);
        trace!(method, id, url = %url, "JSON-RPC request");

        let response = self
            .client
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(method, status = status.as_u16(), "JSON-RPC request failed");
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        body.into_result()
    }
}

fn map_reqwest_error(url: &Url, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connection(format!("Cannot connect to {url}"))
    } else if e.is_decode() {
        TransportError::InvalidResponse(e.to_string())
    } else if let Some(status) = e.status() {
        TransportError::Status(status.as_u16())
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[async_trait]
impl NonceSource for HttpRpcTransport {
    async fn current_nonce(&self, account: &Address) -> Result<u64, TransportError> {
        let result = self
            .call(&self.read_url, "nonce", json!({ "account": account.to_string() }))
            .await?;
        parse_u64_result("nonce", result)
    }
}

#[async_trait]
impl NodeTransport for HttpRpcTransport {
    async fn broadcast_tx_commit(&self, tx: &[u8]) -> Result<BroadcastTxResponse, TransportError> {
        let result = self
            .call(
                &self.write_url,
                "broadcast_tx_commit",
                json!({ "tx": encode_base64(tx) }),
            )
            .await?;
        parse_broadcast_result(result)
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<Vec<u8>>, TransportError> {
        let params = json!({
            "contract": request.contract.to_string(),
            "query": encode_base64(&request.input),
            "caller": request.caller.to_string(),
            "vmType": request.vm as i32,
        });
        let result = self.call(&self.read_url, "query", params).await?;
        parse_bytes_result("query", result)
    }

    async fn resolve(&self, name: &str) -> Result<Option<Address>, TransportError> {
        let result = self
            .call(&self.read_url, "resolve", json!({ "name": name }))
            .await?;
        parse_address_result("resolve", result)
    }

    async fn evm_tx_receipt(&self, tx_hash: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        let result = self
            .call(
                &self.read_url,
                "evmtxreceipt",
                json!({ "txHash": encode_base64(tx_hash) }),
            )
            .await?;
        parse_bytes_result("evmtxreceipt", result)
    }
}
