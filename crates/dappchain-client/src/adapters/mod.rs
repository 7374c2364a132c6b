//! Adapters layer: concrete transports for the outbound ports.

pub mod http;
pub mod json_rpc;
pub mod ws;

pub use http::HttpRpcTransport;
pub use ws::WsEventSource;
