//! Media session: owns one peer transport and its audio-gate bookkeeping.

pub mod error;
pub mod gateway;
pub mod peer;
pub mod signaling;
pub mod webrtc;

pub use error::{MediaError, Result};
pub use peer::{PeerEvent, PeerTransport, PeerTransportFactory};
pub use signaling::SignalMessage;

use log::debug;
use std::sync::Arc;

/// How the audio transport session is negotiated.
#[derive(Debug, Clone)]
pub enum NegotiationMode {
    /// Offer/answer/candidates exchanged as control-channel frames.
    PeerToPeer,
    /// Offer POSTed to an HTTP media gateway, single synchronous answer.
    HttpGateway { url: String },
}

/// One negotiated (or negotiating) audio session.
///
/// Owned exclusively by the orchestrator's owner task, so it needs no
/// internal locking. At most one exists at a time; a new one may only be
/// created after the previous reached closed.
pub struct MediaSession {
    transport: Arc<dyn PeerTransport>,
    track_bound: bool,
    /// Last gate value requested before any track was bound. Reapplied the
    /// instant the track binds; never silently dropped.
    pending_enable: Option<bool>,
    closed: bool,
}

impl MediaSession {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            transport,
            track_bound: false,
            pending_enable: None,
            closed: false,
        }
    }

    pub fn transport(&self) -> Arc<dyn PeerTransport> {
        self.transport.clone()
    }

    pub fn is_track_bound(&self) -> bool {
        self.track_bound
    }

    /// Apply an audio-gate value to the bound track, or buffer it until one
    /// binds. Call sites cannot know track-binding timing, so this never
    /// fails for lack of a track.
    pub async fn set_audio_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.track_bound {
            self.transport.set_audio_enabled(enabled).await
        } else {
            debug!(target: "Media", "No track bound yet, buffering audio gate = {enabled}");
            self.pending_enable = Some(enabled);
            Ok(())
        }
    }

    /// Note that a track is now bound and flush any buffered gate value.
    pub async fn mark_track_bound(&mut self) -> Result<()> {
        self.track_bound = true;
        if let Some(enabled) = self.pending_enable.take() {
            debug!(target: "Media", "Track bound, flushing buffered audio gate = {enabled}");
            self.transport.set_audio_enabled(enabled).await?;
        }
        Ok(())
    }

    /// Release the negotiated session. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.transport.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::peer::mock::MockPeerFactory;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_gate_writes_buffered_until_track_binds() {
        let factory = MockPeerFactory::new();
        let (transport, _rx) = factory.create().await.unwrap();
        let mock = factory.wait_transport(0).await;
        let mut session = MediaSession::new(transport);

        // Issued before the remote track arrives: buffered, not dropped.
        session.set_audio_enabled(false).await.unwrap();
        session.set_audio_enabled(true).await.unwrap();
        assert!(mock.enable_calls.lock().await.is_empty());

        // Track binds: only the latest buffered value is applied.
        session.mark_track_bound().await.unwrap();
        assert_eq!(*mock.enable_calls.lock().await, vec![true]);

        // After binding, writes go straight through.
        session.set_audio_enabled(false).await.unwrap();
        assert_eq!(*mock.enable_calls.lock().await, vec![true, false]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let factory = MockPeerFactory::new();
        let (transport, _rx) = factory.create().await.unwrap();
        let mock = factory.wait_transport(0).await;
        let mut session = MediaSession::new(transport);

        session.close().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(mock.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_write_after_close_is_noop() {
        let factory = MockPeerFactory::new();
        let (transport, _rx) = factory.create().await.unwrap();
        let mock = factory.wait_transport(0).await;
        let mut session = MediaSession::new(transport);

        session.close().await.unwrap();
        session.set_audio_enabled(true).await.unwrap();
        assert!(mock.enable_calls.lock().await.is_empty());
    }
}
