//! Domain layer: configuration, results and the error taxonomy.

pub mod config;
pub mod errors;
pub mod results;

pub use config::{
    ClientConfig, EndpointConfig, EventConfig, NonceConfig, ReconnectConfig, TimeoutConfig,
};
pub use errors::{
    AbiError, BroadcastError, ClientError, ConfigError, MiddlewareError, SubscriptionError,
    TransportError, TxPhase, TxRejectedError,
};
pub use results::{BroadcastResult, BroadcastTxResponse, DeployResult, QueryRequest, TxPhaseResult};
