//! Client configuration with validation.
//!
//! All sections default to a node running on localhost, so a TOML document
//! only needs to name what differs:
//!
//! ```toml
//! chain_id = "default"
//!
//! [endpoints]
//! write_url = "http://127.0.0.1:46658/rpc"
//!
//! [events.reconnect]
//! max_attempts = 3
//! ```

use crate::domain::errors::ConfigError;
use crate::middleware::NoncePolicy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chain the client talks to
    pub chain_id: String,
    /// Node endpoints
    pub endpoints: EndpointConfig,
    /// Request timeouts
    pub timeouts: TimeoutConfig,
    /// Nonce stage behavior
    pub nonce: NonceConfig,
    /// Event stream behavior
    pub events: EventConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain_id: "default".to_string(),
            endpoints: EndpointConfig::default(),
            timeouts: TimeoutConfig::default(),
            nonce: NonceConfig::default(),
            events: EventConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::EmptyChainId);
        }

        self.endpoints.write_url()?;
        self.endpoints.read_url()?;
        self.endpoints.events_url()?;

        if self.timeouts.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout_ms cannot be 0".into(),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "events.channel_capacity cannot be 0".into(),
            ));
        }

        let reconnect = &self.events.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "reconnect.base_delay_ms cannot be 0".into(),
            ));
        }
        if reconnect.base_delay_ms > reconnect.max_delay_ms {
            return Err(ConfigError::InvalidTimeout(
                "reconnect.base_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        if reconnect.max_attempts == 0 {
            return Err(ConfigError::InvalidLimit(
                "reconnect.max_attempts cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Node endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Write endpoint (commit)
    pub write_url: String,
    /// Read endpoint (query, nonce, resolve)
    pub read_url: String,
    /// Push endpoint (events)
    pub events_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            write_url: "http://127.0.0.1:46658/rpc".to_string(),
            read_url: "http://127.0.0.1:46658/query".to_string(),
            events_url: "ws://127.0.0.1:46658/queryws".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Parsed write endpoint.
    pub fn write_url(&self) -> Result<Url, ConfigError> {
        parse_url("write_url", &self.write_url, &["http", "https"])
    }

    /// Parsed read endpoint.
    pub fn read_url(&self) -> Result<Url, ConfigError> {
        parse_url("read_url", &self.read_url, &["http", "https"])
    }

    /// Parsed push endpoint.
    pub fn events_url(&self) -> Result<Url, ConfigError> {
        parse_url("events_url", &self.events_url, &["ws", "wss"])
    }
}

fn parse_url(name: &'static str, url: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        name,
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::InvalidUrl {
            name,
            url: url.to_string(),
            reason: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    Ok(parsed)
}

/// Timeout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request timeout for the read and write endpoints
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Nonce stage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonceConfig {
    pub policy: NoncePolicy,
}

/// Event stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Buffered notifications between the socket and the dispatcher
    pub channel_capacity: usize,
    /// Topics to subscribe to; `None` subscribes to everything
    pub topics: Option<Vec<String>>,
    /// Resubscription policy
    pub reconnect: ReconnectConfig,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            topics: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Exponential backoff for event stream resubscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before the outage is reported; retries
    /// then continue every `max_delay_ms`
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}
