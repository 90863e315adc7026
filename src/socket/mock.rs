//! Mock control-channel transport for tests.

use super::consts::EVENT_CHANNEL_CAPACITY;
use super::error::{Result, SocketError};
use super::{ControlEvent, ControlTransport, ControlTransportFactory};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{Duration, sleep};

/// In-memory control transport recording outbound frames. Closing it emits a
/// `Closed` event on the connection's event channel, like a real websocket
/// peer acknowledging the close.
pub struct MockControlTransport {
    pub sent: Mutex<Vec<String>>,
    pub close_calls: Mutex<Vec<(u16, String)>>,
    pub fail_sends: AtomicBool,
    events: Sender<ControlEvent>,
}

#[async_trait]
impl ControlTransport for MockControlTransport {
    async fn send(&self, frame: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SocketError::NotConnected);
        }
        self.sent.lock().await.push(frame.to_string());
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) {
        self.close_calls
            .lock()
            .await
            .push((code, reason.to_string()));
        let _ = self
            .events
            .send(ControlEvent::Closed {
                code,
                reason: reason.to_string(),
            })
            .await;
    }
}

/// Handle a test uses to inspect one mock connection and inject inbound
/// events (frames, failures) as if they came from the server.
#[derive(Clone)]
pub struct MockControlHandle {
    pub transport: Arc<MockControlTransport>,
    pub events: Sender<ControlEvent>,
}

impl MockControlHandle {
    pub async fn emit(&self, event: ControlEvent) {
        self.events
            .send(event)
            .await
            .expect("orchestrator dropped control events");
    }

    pub async fn sent_frames(&self) -> Vec<String> {
        self.transport.sent.lock().await.clone()
    }
}

/// Factory producing mock connections; each `connect` emits `Opened` unless
/// `manual_open` is set, letting tests script the full lifecycle themselves.
pub struct MockControlFactory {
    pub fail_connect: AtomicBool,
    pub manual_open: AtomicBool,
    handles: Mutex<Vec<MockControlHandle>>,
}

impl MockControlFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_connect: AtomicBool::new(false),
            manual_open: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Wait for the `index`-th connection to be established.
    pub async fn wait_handle(&self, index: usize) -> MockControlHandle {
        for _ in 0..200 {
            if let Some(handle) = self.handles.lock().await.get(index).cloned() {
                return handle;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("mock control connection {index} was never opened");
    }

    pub async fn connection_count(&self) -> usize {
        self.handles.lock().await.len()
    }
}

#[async_trait]
impl ControlTransportFactory for MockControlFactory {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Arc<dyn ControlTransport>, Receiver<ControlEvent>)> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SocketError::Connect("connection refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        if !self.manual_open.load(Ordering::SeqCst) {
            let _ = events_tx.send(ControlEvent::Opened).await;
        }

        let transport = Arc::new(MockControlTransport {
            sent: Mutex::new(Vec::new()),
            close_calls: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            events: events_tx.clone(),
        });
        self.handles.lock().await.push(MockControlHandle {
            transport: transport.clone(),
            events: events_tx,
        });
        Ok((transport, events_rx))
    }
}
