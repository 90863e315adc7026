//! Transport-negotiation collaborator seam.
//!
//! The orchestrator and [`super::MediaSession`] talk to the underlying peer
//! connection only through this trait; the production implementation lives in
//! [`super::webrtc`].

use super::error::{MediaError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

/// Events emitted by a peer transport, consumed by the orchestrator.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// An audio track (local or remote) is bound and gate writes now take
    /// effect. Remote-track arrival is asynchronous and unordered with
    /// respect to offer/answer completion.
    TrackBound,
    /// A local ICE candidate was gathered and should be relayed through the
    /// signaling sink, if one is attached.
    LocalCandidate(String),
    /// The underlying connection finished closing.
    Closed,
}

/// One audio peer connection: offer/answer/candidate exchange plus the
/// audio-relay switch.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the local offer (SDP text). In gather-first mode the returned
    /// offer already contains all gathered candidates.
    async fn create_offer(&self) -> Result<String>;

    /// Callee role: apply a remote offer and produce the local answer.
    async fn create_answer(&self, remote_offer: &str) -> Result<String>;

    /// Apply the remote answer to our earlier offer.
    async fn set_remote_answer(&self, sdp: &str) -> Result<()>;

    /// Apply a trickled remote ICE candidate.
    async fn add_remote_candidate(&self, candidate: &str) -> Result<()>;

    /// Switch whether the bound audio track relays sound.
    async fn set_audio_enabled(&self, enabled: bool) -> Result<()>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Creates peer transports; one per media session.
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    async fn create(&self) -> Result<(Arc<dyn PeerTransport>, Receiver<PeerEvent>)>;
}

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use tokio::sync::mpsc::{self, Sender};
    use tokio::time::{Duration, sleep};

    const MOCK_OFFER: &str = "v=0 mock-offer";
    const MOCK_ANSWER: &str = "v=0 mock-answer";

    /// In-memory peer transport recording every call.
    pub struct MockPeerTransport {
        pub remote_answers: Mutex<Vec<String>>,
        pub remote_candidates: Mutex<Vec<String>>,
        pub enable_calls: Mutex<Vec<bool>>,
        pub close_calls: AtomicUsize,
        pub fail_offer: AtomicBool,
        events: Sender<PeerEvent>,
    }

    impl MockPeerTransport {
        pub async fn emit(&self, event: PeerEvent) {
            let _ = self.events.send(event).await;
        }
    }

    #[async_trait]
    impl PeerTransport for MockPeerTransport {
        async fn create_offer(&self) -> Result<String> {
            if self.fail_offer.load(Ordering::SeqCst) {
                return Err(MediaError::Negotiation("offer rejected".to_string()));
            }
            Ok(MOCK_OFFER.to_string())
        }

        async fn create_answer(&self, _remote_offer: &str) -> Result<String> {
            Ok(MOCK_ANSWER.to_string())
        }

        async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
            self.remote_answers.lock().await.push(sdp.to_string());
            Ok(())
        }

        async fn add_remote_candidate(&self, candidate: &str) -> Result<()> {
            self.remote_candidates
                .lock()
                .await
                .push(candidate.to_string());
            Ok(())
        }

        async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
            self.enable_calls.lock().await.push(enabled);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(PeerEvent::Closed).await;
            Ok(())
        }
    }

    /// Factory handing out mock transports and keeping handles for the test.
    pub struct MockPeerFactory {
        pub fail_create: AtomicBool,
        transports: Mutex<Vec<Arc<MockPeerTransport>>>,
    }

    impl MockPeerFactory {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                fail_create: AtomicBool::new(false),
                transports: Mutex::new(Vec::new()),
            })
        }

        pub async fn wait_transport(&self, index: usize) -> Arc<MockPeerTransport> {
            for _ in 0..200 {
                if let Some(t) = self.transports.lock().await.get(index).cloned() {
                    return t;
                }
                sleep(Duration::from_millis(10)).await;
            }
            panic!("mock peer transport {index} was never created");
        }

        pub async fn transport_count(&self) -> usize {
            self.transports.lock().await.len()
        }
    }

    #[async_trait]
    impl PeerTransportFactory for MockPeerFactory {
        async fn create(&self) -> Result<(Arc<dyn PeerTransport>, Receiver<PeerEvent>)> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(MediaError::Negotiation(
                    "peer connection unavailable".to_string(),
                ));
            }
            let (tx, rx) = mpsc::channel(64);
            let transport = Arc::new(MockPeerTransport {
                remote_answers: Mutex::new(Vec::new()),
                remote_candidates: Mutex::new(Vec::new()),
                enable_calls: Mutex::new(Vec::new()),
                close_calls: AtomicUsize::new(0),
                fail_offer: AtomicBool::new(false),
                events: tx,
            });
            self.transports.lock().await.push(transport.clone());
            Ok((transport, rx))
        }
    }
}
