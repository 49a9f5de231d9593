//! Transport capability
//!
//! A bidirectional channel of tagged messages. The session core only sees
//! the [`Transport`] trait; the backend is picked from configuration at
//! construction time, one named variant per protocol.

mod websocket;

pub use websocket::{WebSocketSettings, WebSocketTransport};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{ClientError, ClientResult};

/// How a message payload should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// JSON control message
    Text,
    /// Encoded audio frame
    Binary,
    /// Transport-level control frame
    Control,
}

/// The unit exchanged with the transport
#[derive(Debug, Clone)]
pub struct Message {
    pub payload: Vec<u8>,
    pub kind: MessageKind,
}

/// Bidirectional message channel to the server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection. Failures map to `ConnectionFailed`.
    async fn connect(&self) -> ClientResult<()>;

    /// Send one message of the given kind.
    async fn send(&self, payload: Vec<u8>, kind: MessageKind) -> ClientResult<()>;

    /// Take the inbound queue. The queue closes when the connection ends,
    /// which is how the session learns the transport is gone. Returns
    /// `None` if already taken or not connected.
    fn take_inbound(&self) -> Option<mpsc::Receiver<Message>>;

    /// Close the connection and stop the read pump.
    async fn close(&self) -> ClientResult<()>;

    fn protocol_name(&self) -> &'static str;
}

/// Build the transport named in the configuration.
///
/// A selected transport without its config section is a startup error,
/// caught here before any connect is attempted.
pub fn from_config(config: &Config) -> ClientResult<Arc<dyn Transport>> {
    let network = &config.system.network;
    match network.transport.as_str() {
        "websocket" => {
            let ws = network.websocket.as_ref().ok_or_else(|| {
                ClientError::Config(
                    "websocket transport selected but [system.network.websocket] is not configured"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(WebSocketTransport::new(WebSocketSettings {
                url: ws.url.clone(),
                access_token: ws.access_token.clone(),
                protocol_version: ws.protocol_version,
                device_id: config.system.device_id.clone(),
                client_id: config.system.client_id.clone(),
            })))
        }
        other => Err(ClientError::Config(format!(
            "unsupported transport: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_websocket_section() {
        let config: Config = toml::from_str(
            r#"
            [system.network]
            transport = "websocket"
            "#,
        )
        .unwrap();
        let err = match from_config(&config) {
            Ok(_) => panic!("expected from_config to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_from_config_rejects_unknown_transport() {
        let config: Config = toml::from_str(
            r#"
            [system.network]
            transport = "carrier-pigeon"
            "#,
        )
        .unwrap();
        let err = match from_config(&config) {
            Ok(_) => panic!("expected from_config to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_from_config_builds_websocket_backend() {
        let config: Config = toml::from_str(
            r#"
            [system]
            device_id = "aa:bb:cc"
            client_id = "dev-1"

            [system.network]
            transport = "websocket"

            [system.network.websocket]
            url = "wss://example.test/session"
            access_token = "token"
            "#,
        )
        .unwrap();
        let transport = from_config(&config).unwrap();
        assert_eq!(transport.protocol_name(), "websocket");
    }
}
