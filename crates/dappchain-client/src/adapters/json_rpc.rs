//! JSON-RPC 2.0 shapes spoken by the node's HTTP and WebSocket endpoints.
//!
//! Byte fields travel as standard base64. Heights and codes may arrive as
//! JSON numbers or as decimal strings depending on the node version.

use crate::domain::errors::TransportError;
use crate::domain::results::{BroadcastTxResponse, TxPhaseResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dappchain_types::{Address, ChainEvent, DecodeError, LocalAddress};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
    pub id: u64,
}

impl<'a, P: Serialize> JsonRpcRequest<'a, P> {
    pub fn new(method: &'a str, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// The `result` member, or the error object as a [`TransportError`].
    ///
    /// A missing result is returned as `Value::Null`.
    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(error) = self.error {
            let message = match error.data {
                Some(Value::String(data)) if !data.is_empty() => {
                    format!("{}: {}", error.message, data)
                }
                _ => error.message,
            };
            return Err(TransportError::Rpc {
                code: error.code,
                message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Num(u64),
    Str(String),
}

impl NumOrString {
    fn to_u64(&self) -> Option<u64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PhaseJson {
    #[serde(default)]
    code: Option<NumOrString>,
    #[serde(default)]
    log: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BroadcastJson {
    #[serde(default)]
    check_tx: PhaseJson,
    #[serde(default)]
    deliver_tx: PhaseJson,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    height: Option<NumOrString>,
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(field: &str, s: &str) -> Result<Vec<u8>, TransportError> {
    STANDARD
        .decode(s.trim())
        .map_err(|e| TransportError::InvalidResponse(format!("{field}: {e}")))
}

fn phase_result(name: &str, phase: PhaseJson) -> Result<TxPhaseResult, TransportError> {
    let code = match phase.code {
        None => 0,
        Some(code) => code
            .to_u64()
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(|| TransportError::InvalidResponse(format!("{name}.code: {code:?}")))?,
    };
    let data = match phase.data.as_deref() {
        None | Some("") => Vec::new(),
        Some(data) => decode_base64(name, data)?,
    };
    Ok(TxPhaseResult {
        code,
        log: phase.log,
        data,
    })
}

/// Parse the `broadcast_tx_commit` result.
pub fn parse_broadcast_result(result: Value) -> Result<BroadcastTxResponse, TransportError> {
    if result.is_null() {
        return Err(TransportError::InvalidResponse(
            "broadcast_tx_commit returned no result".into(),
        ));
    }
    let raw: BroadcastJson = serde_json::from_value(result)
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

    let height = match raw.height {
        None => 0,
        Some(height) => height.to_u64().ok_or_else(|| {
            TransportError::InvalidResponse(format!("height: {height:?}"))
        })?,
    };

    Ok(BroadcastTxResponse {
        check_tx: phase_result("check_tx", raw.check_tx)?,
        deliver_tx: phase_result("deliver_tx", raw.deliver_tx)?,
        hash: raw.hash,
        height,
    })
}

/// Parse a base64 byte result; null or empty means absent.
pub fn parse_bytes_result(field: &str, result: Value) -> Result<Option<Vec<u8>>, TransportError> {
    match result {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => {
            let bytes = decode_base64(field, &s)?;
            Ok((!bytes.is_empty()).then_some(bytes))
        }
        other => Err(TransportError::InvalidResponse(format!(
            "{field}: expected base64 string, got {other}"
        ))),
    }
}

/// Parse a numeric result that may be a number or a decimal string.
pub fn parse_u64_result(field: &str, result: Value) -> Result<u64, TransportError> {
    let parsed = match &result {
        Value::Null => Some(0),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| TransportError::InvalidResponse(format!("{field}: {result}")))
}

/// Parse an address result in text form; null or empty means absent.
pub fn parse_address_result(field: &str, result: Value) -> Result<Option<Address>, TransportError> {
    match result {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|e: DecodeError| TransportError::InvalidResponse(format!("{field}: {e}"))),
        other => Err(TransportError::InvalidResponse(format!(
            "{field}: expected address string, got {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct AddressJson {
    chain_id: String,
    local: String,
}

impl AddressJson {
    fn to_address(&self) -> Result<Address, DecodeError> {
        let local = STANDARD
            .decode(&self.local)
            .map_err(|e| DecodeError::InvalidEncoding(format!("address.local: {e}")))?;
        Ok(Address::new(
            self.chain_id.clone(),
            LocalAddress::from_slice(&local)?,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct EventJson {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    caller: Option<AddressJson>,
    address: AddressJson,
    #[serde(default)]
    plugin_name: String,
    #[serde(default)]
    block_height: Option<NumOrString>,
    #[serde(default)]
    encoded_body: Option<String>,
    #[serde(default)]
    tx_hash: Option<String>,
}

fn optional_base64(field: &str, value: Option<&str>) -> Result<Vec<u8>, DecodeError> {
    match value {
        None | Some("") => Ok(Vec::new()),
        Some(s) => STANDARD
            .decode(s)
            .map_err(|e| DecodeError::InvalidEncoding(format!("{field}: {e}"))),
    }
}

/// Parse a JSON text frame from the push endpoint.
///
/// Returns `Ok(None)` for frames that carry no event (subscription
/// acknowledgements, empty results).
pub fn parse_event_notification(text: &str) -> Result<Option<ChainEvent>, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    let event = match value.get("result") {
        Some(result) => result,
        None if value.get("jsonrpc").is_some() => return Ok(None),
        None => &value,
    };
    if !event.is_object() || event.get("address").is_none() {
        return Ok(None);
    }

    let raw: EventJson = serde_json::from_value(event.clone())
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    let block_height = match &raw.block_height {
        None => 0,
        Some(height) => height
            .to_u64()
            .ok_or_else(|| DecodeError::InvalidEncoding(format!("block_height: {height:?}")))?,
    };

    Ok(Some(ChainEvent {
        topics: raw.topics,
        contract: raw.address.to_address()?,
        caller: raw.caller.as_ref().map(AddressJson::to_address).transpose()?,
        plugin_name: raw.plugin_name,
        block_height,
        body: optional_base64("encoded_body", raw.encoded_body.as_deref())?,
        tx_hash: optional_base64("tx_hash", raw.tx_hash.as_deref())?,
    }))
}
