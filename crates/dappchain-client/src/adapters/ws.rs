//! WebSocket adapter for the push endpoint.
//!
//! Each [`EventSource::connect`] opens one socket, sends `subscribe`, and
//! spawns a forwarding task that pushes frames into the returned channel.
//! The task sends `unsubevents` and closes the socket once the receiver is
//! dropped.

use super::json_rpc::JsonRpcRequest;
use crate::domain::config::ClientConfig;
use crate::domain::errors::{ConfigError, SubscriptionError};
use crate::ports::{EventSource, RawEvent, RawEventStream};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event source over tokio-tungstenite.
pub struct WsEventSource {
    url: Url,
    topics: Option<Vec<String>>,
    channel_capacity: usize,
}

impl WsEventSource {
    pub fn new(url: Url, topics: Option<Vec<String>>, channel_capacity: usize) -> Self {
        Self {
            url,
            topics,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.endpoints.events_url()?,
            config.events.topics.clone(),
            config.events.channel_capacity,
        ))
    }

    fn request_text(method: &str, params: serde_json::Value, id: u64) -> String {
        // Serializing a `json!` value cannot fail.
        serde_json::to_string(&JsonRpcRequest::new(method, params, id)).unwrap_or_default()
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn connect(&self) -> Result<RawEventStream, SubscriptionError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;
        let (mut write, read) = socket.split();

        let subscribe = Self::request_text("subscribe", json!({ "topics": self.topics }), 1);
        write
            .send(Message::Text(subscribe.into()))
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        info!(url = %self.url, "Subscribed to event stream");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(forward(write, read, tx));
        Ok(rx)
    }
}

async fn forward(
    mut write: SplitSink<Socket, Message>,
    mut read: SplitStream<Socket>,
    tx: mpsc::Sender<Result<RawEvent, SubscriptionError>>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("Event receiver dropped, unsubscribing");
                let unsubscribe = WsEventSource::request_text("unsubevents", json!({}), 2);
                let _ = write.send(Message::Text(unsubscribe.into())).await;
                let _ = write.close().await;
                return;
            }
            frame = read.next() => {
                let item = match frame {
                    Some(Ok(Message::Text(text))) => Ok(RawEvent::Json(text.as_str().to_owned())),
                    Some(Ok(Message::Binary(data))) => Ok(RawEvent::Binary(data.to_vec())),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => Err(SubscriptionError::Disconnected(
                        frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "closed by node".into()),
                    )),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => Err(SubscriptionError::Disconnected(e.to_string())),
                    None => Err(SubscriptionError::Disconnected("stream ended".into())),
                };

                let finished = item.is_err();
                if tx.send(item).await.is_err() || finished {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_shape() {
        let text = WsEventSource::request_text(
            "subscribe",
            json!({ "topics": Some(vec!["transfer".to_string()]) }),
            1,
        );
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "subscribe");
        assert_eq!(value["params"]["topics"][0], "transfer");
    }

    #[test]
    fn test_from_config_requires_ws_scheme() {
        let mut config = ClientConfig::default();
        assert!(WsEventSource::from_config(&config).is_ok());
        config.endpoints.events_url = "https://127.0.0.1/queryws".into();
        assert!(WsEventSource::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let source = WsEventSource::new(Url::parse("ws://127.0.0.1:1/queryws").unwrap(), None, 8);
        assert!(matches!(
            source.connect().await,
            Err(SubscriptionError::Connect(_))
        ));
    }
}
