//! WebSocket transport backend
//!
//! Dials the server with the device identity headers, then splits the
//! stream: a read pump forwards inbound frames into a bounded queue, and
//! outbound sends go through the write half behind a lock. The queue
//! closing is the session's signal that the connection is gone.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::error::{ClientError, ClientResult};

use super::{Message, MessageKind, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, tungstenite::Message>;
type WsSource = SplitStream<WsStream>;

/// Inbound frames buffered ahead of the session's pump
const INBOUND_QUEUE_DEPTH: usize = 100;

/// Connection settings for the websocket backend
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    pub url: String,
    pub access_token: String,
    pub protocol_version: u32,
    pub device_id: String,
    pub client_id: String,
}

pub struct WebSocketTransport {
    settings: WebSocketSettings,
    sink: Mutex<Option<WsSink>>,
    inbound: parking_lot::Mutex<Option<mpsc::Receiver<Message>>>,
    read_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new(settings: WebSocketSettings) -> Self {
        Self {
            settings,
            sink: Mutex::new(None),
            inbound: parking_lot::Mutex::new(None),
            read_task: parking_lot::Mutex::new(None),
        }
    }

    fn build_request(&self) -> ClientResult<tungstenite::http::Request<()>> {
        tungstenite::http::Request::builder()
            .uri(self.settings.url.as_str())
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header(
                "Authorization",
                format!("Bearer {}", self.settings.access_token),
            )
            .header(
                "Protocol-Version",
                self.settings.protocol_version.to_string(),
            )
            .header("Device-Id", self.settings.device_id.as_str())
            .header("Client-Id", self.settings.client_id.as_str())
            .body(())
            .map_err(|e| ClientError::ConnectionFailed(format!("failed to build request: {e}")))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> ClientResult<()> {
        let request = self.build_request()?;

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        *self.inbound.lock() = Some(rx);
        *self.read_task.lock() = Some(tokio::spawn(read_pump(source, tx)));

        Ok(())
    }

    async fn send(&self, payload: Vec<u8>, kind: MessageKind) -> ClientResult<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| ClientError::Transport("not connected".to_string()))?;

        let frame = match kind {
            MessageKind::Text => {
                let text = String::from_utf8(payload).map_err(|e| {
                    ClientError::Transport(format!("outbound text frame is not utf-8: {e}"))
                })?;
                tungstenite::Message::Text(text)
            }
            MessageKind::Binary => tungstenite::Message::Binary(payload),
            MessageKind::Control => tungstenite::Message::Ping(payload),
        };

        sink.send(frame)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbound.lock().take()
    }

    async fn close(&self) -> ClientResult<()> {
        let mut guard = self.sink.lock().await;
        if let Some(sink) = guard.as_mut() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "websocket close handshake failed");
            }
        }
        *guard = None;
        drop(guard);

        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }
        Ok(())
    }

    fn protocol_name(&self) -> &'static str {
        "websocket"
    }
}

/// Forward inbound frames until the connection ends, then drop the sender
/// so the queue closes.
async fn read_pump(mut source: WsSource, tx: mpsc::Sender<Message>) {
    while let Some(frame) = source.next().await {
        let message = match frame {
            Ok(tungstenite::Message::Text(text)) => Message {
                payload: text.into_bytes(),
                kind: MessageKind::Text,
            },
            Ok(tungstenite::Message::Binary(data)) => Message {
                payload: data,
                kind: MessageKind::Binary,
            },
            Ok(tungstenite::Message::Ping(data)) | Ok(tungstenite::Message::Pong(data)) => {
                Message {
                    payload: data,
                    kind: MessageKind::Control,
                }
            }
            Ok(tungstenite::Message::Close(_)) => {
                debug!("websocket closed by server");
                break;
            }
            Ok(tungstenite::Message::Frame(_)) => continue,
            Err(e) => {
                error!(error = %e, "websocket read failed");
                break;
            }
        };

        if tx.send(message).await.is_err() {
            warn!("inbound queue dropped, stopping read pump");
            break;
        }
    }
    debug!("websocket read pump stopped");
}
