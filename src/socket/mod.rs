mod consts;
pub mod error;
pub mod mock;
mod ws;

pub use consts::{CLOSE_CODE_NORMAL, EVENT_CHANNEL_CAPACITY};
pub use error::{Result, SocketError};
pub use ws::WebSocketTransportFactory;

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::Receiver;

/// Lifecycle events emitted by the control channel, delivered in arrival
/// order through a single channel to the one registered consumer.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    Opened,
    Frame(String),
    Closed { code: u16, reason: String },
    Failed(String),
}

/// One live control-channel connection.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Send one text frame.
    async fn send(&self, frame: &str) -> Result<()>;
    /// Close the connection. Safe to call more than once.
    async fn close(&self, code: u16, reason: &str);
}

/// Establishes control-channel connections.
#[async_trait]
pub trait ControlTransportFactory: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn ControlTransport>, Receiver<ControlEvent>)>;
}

/// Owns at most one control-channel connection.
///
/// `open` while already connected is a logged no-op; after a `Closed` or
/// `Failed` event the caller must invoke [`ControlSocket::reset`] so a
/// subsequent `open` is accepted again. Reconnection is never attempted
/// internally; retrying is the orchestrator's (i.e. the user's) decision.
pub struct ControlSocket {
    factory: Arc<dyn ControlTransportFactory>,
    transport: Mutex<Option<Arc<dyn ControlTransport>>>,
}

impl ControlSocket {
    pub fn new(factory: Arc<dyn ControlTransportFactory>) -> Self {
        Self {
            factory,
            transport: Mutex::new(None),
        }
    }

    /// Open a connection to `url` and return its event stream.
    ///
    /// Returns `Ok(None)` if a connection is already held (idempotent-connect).
    pub async fn open(&self, url: &str) -> Result<Option<Receiver<ControlEvent>>> {
        let mut guard = self.transport.lock().await;
        if guard.is_some() {
            debug!(target: "ControlSocket", "Already connected, ignoring open()");
            return Ok(None);
        }

        info!(target: "ControlSocket", "Dialing {url}");
        let (transport, events) = self.factory.connect(url).await?;
        *guard = Some(transport);
        Ok(Some(events))
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Send one text frame; fails with [`SocketError::NotConnected`] when no
    /// connection is held.
    pub async fn send(&self, frame: &str) -> Result<()> {
        let guard = self.transport.lock().await;
        let transport = guard.as_ref().ok_or(SocketError::NotConnected)?;
        debug!(target: "ControlSocket", "--> {frame}");
        transport.send(frame).await
    }

    /// Close the held connection, if any. Idempotent.
    pub async fn close(&self, code: u16, reason: &str) {
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.close(code, reason).await;
        }
    }

    /// Drop the connection handle after a `Closed`/`Failed` event so the next
    /// `open` is accepted.
    pub async fn reset(&self) {
        *self.transport.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockControlFactory;
    use super::*;

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let factory = MockControlFactory::new();
        let socket = ControlSocket::new(factory.clone());
        let _events = socket.open("ws://test").await.unwrap().unwrap();
        let handle = factory.wait_handle(0).await;

        socket.close(1000, "done").await;
        socket.close(1000, "done").await;
        socket.close(1000, "done").await;
        assert_eq!(handle.transport.close_calls.lock().await.len(), 1);
        assert!(!socket.is_connected().await);

        // Closed means reopenable.
        assert!(socket.open("ws://test").await.unwrap().is_some());
        assert_eq!(factory.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_close_without_connection_is_a_noop() {
        let factory = MockControlFactory::new();
        let socket = ControlSocket::new(factory.clone());
        socket.close(1000, "done").await;
        assert_eq!(factory.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_open_while_connected_is_a_noop() {
        let factory = MockControlFactory::new();
        let socket = ControlSocket::new(factory.clone());
        let _events = socket.open("ws://test").await.unwrap().unwrap();

        assert!(socket.open("ws://test").await.unwrap().is_none());
        assert_eq!(factory.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let factory = MockControlFactory::new();
        let socket = ControlSocket::new(factory);
        assert!(matches!(
            socket.send("0").await,
            Err(SocketError::NotConnected)
        ));
    }
}
