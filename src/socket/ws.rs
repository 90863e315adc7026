use super::consts::EVENT_CHANNEL_CAPACITY;
use super::error::{Result, SocketError};
use super::{ControlEvent, ControlTransport, ControlTransportFactory};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

/// Control-channel transport over a websocket, one text message per frame.
struct WebSocketControlTransport {
    sink: Mutex<Option<WsSink>>,
}

#[async_trait]
impl ControlTransport for WebSocketControlTransport {
    async fn send(&self, frame: &str) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SocketError::NotConnected)?;
        sink.send(Message::text(frame.to_string()))
            .await
            .map_err(|e| SocketError::WebSocket(e.to_string()))
    }

    async fn close(&self, code: u16, reason: &str) {
        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                debug!(target: "ControlSocket", "Error sending close frame: {e}");
            }
        }
    }
}

/// Connects the control channel over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransportFactory;

impl WebSocketTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ControlTransportFactory for WebSocketTransportFactory {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn ControlTransport>, Receiver<ControlEvent>)> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;

        let (sink, stream) = ws.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // The connection exists before the pump starts, so Opened is
        // guaranteed to be the first event delivered.
        let _ = events_tx.send(ControlEvent::Opened).await;
        tokio::spawn(read_pump(stream, events_tx));

        let transport = Arc::new(WebSocketControlTransport {
            sink: Mutex::new(Some(sink)),
        });
        Ok((transport, events_rx))
    }
}

async fn read_pump(mut stream: WsStream, events: Sender<ControlEvent>) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(target: "ControlSocket", "<-- {text}");
                if events
                    .send(ControlEvent::Frame(text.to_string()))
                    .await
                    .is_err()
                {
                    warn!(target: "ControlSocket", "Event receiver dropped, closing read pump");
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                    None => (1005, String::new()),
                };
                trace!(target: "ControlSocket", "Received close frame ({code}): {reason}");
                let _ = events.send(ControlEvent::Closed { code, reason }).await;
                return;
            }
            Some(Ok(Message::Binary(data))) => {
                warn!(
                    target: "ControlSocket",
                    "Ignoring unexpected binary frame ({} bytes)",
                    data.len()
                );
            }
            Some(Ok(_)) => {
                // Ping/pong are handled by tungstenite itself.
            }
            Some(Err(e)) => {
                let _ = events.send(ControlEvent::Failed(e.to_string())).await;
                return;
            }
            None => {
                trace!(target: "ControlSocket", "Websocket stream ended");
                let _ = events
                    .send(ControlEvent::Closed {
                        code: 1006,
                        reason: "connection reset".to_string(),
                    })
                    .await;
                return;
            }
        }
    }
}
