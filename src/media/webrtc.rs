//! WebRTC-backed peer transport.
//!
//! One `RTCPeerConnection` per session, carrying a single opus audio track.
//! Device playout routing (speaker/earpiece/Bluetooth) is an external
//! collaborator; this transport only owns negotiation and the relay switch
//! the audio pipeline consults.

use super::error::{MediaError, Result};
use super::peer::{PeerEvent, PeerTransport, PeerTransportFactory};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, Receiver, Sender};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const LOCAL_TRACK_ID: &str = "audio";
const LOCAL_STREAM_ID: &str = "intercom";
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the WebRTC peer transport.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// STUN server, e.g. `stun:192.168.0.36:3478`. None for host-only
    /// candidates (LAN deployments).
    pub stun_server: Option<String>,
    /// Gather all candidates before returning the offer (gateway mode)
    /// instead of trickling them as `LocalCandidate` events (p2p mode).
    pub gather_before_offer: bool,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            stun_server: None,
            gather_before_offer: true,
        }
    }
}

pub struct RtcPeerTransport {
    peer_connection: Arc<RTCPeerConnection>,
    gather_before_offer: bool,
    /// Consulted by the audio pipeline: whether the bound track relays sound.
    audio_enabled: AtomicBool,
    closed: AtomicBool,
    events: Sender<PeerEvent>,
}

impl RtcPeerTransport {
    /// Whether the audio pipeline should currently relay sound.
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    fn map_err(e: webrtc::Error) -> MediaError {
        MediaError::Transport(e.to_string())
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(Self::map_err)?;

        if self.gather_before_offer {
            let mut gather_complete = self.peer_connection.gathering_complete_promise().await;
            self.peer_connection
                .set_local_description(offer)
                .await
                .map_err(Self::map_err)?;
            let _ = gather_complete.recv().await;
            let local = self
                .peer_connection
                .local_description()
                .await
                .ok_or_else(|| {
                    MediaError::Negotiation("no local description after gathering".to_string())
                })?;
            Ok(local.sdp)
        } else {
            let sdp = offer.sdp.clone();
            self.peer_connection
                .set_local_description(offer)
                .await
                .map_err(Self::map_err)?;
            Ok(sdp)
        }
    }

    async fn create_answer(&self, remote_offer: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(remote_offer.to_string())
            .map_err(|e| MediaError::MalformedDescription(e.to_string()))?;
        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(Self::map_err)?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(Self::map_err)?;
        let sdp = answer.sdp.clone();
        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(Self::map_err)?;
        Ok(sdp)
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| MediaError::MalformedDescription(e.to_string()))?;
        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(Self::map_err)
    }

    async fn add_remote_candidate(&self, candidate: &str) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.to_string(),
                ..Default::default()
            })
            .await
            .map_err(Self::map_err)
    }

    async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        let was = self.audio_enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(target: "Media", "Audio relay {}", if enabled { "enabled" } else { "disabled" });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.peer_connection.close().await.map_err(Self::map_err)?;
        let _ = self.events.send(PeerEvent::Closed).await;
        info!(target: "Media", "Peer connection closed");
        Ok(())
    }
}

/// Builds WebRTC peer transports with an opus send track pre-attached.
pub struct RtcPeerTransportFactory {
    config: RtcConfig,
}

impl RtcPeerTransportFactory {
    pub fn new(config: RtcConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerTransportFactory for RtcPeerTransportFactory {
    async fn create(&self) -> Result<(Arc<dyn PeerTransport>, Receiver<PeerEvent>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(RtcPeerTransport::map_err)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(RtcPeerTransport::map_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = match &self.config.stun_server {
            Some(stun) => vec![RTCIceServer {
                urls: vec![stun.clone()],
                ..Default::default()
            }],
            None => Vec::new(),
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(RtcPeerTransport::map_err)?,
        );

        let local_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            LOCAL_TRACK_ID.to_owned(),
            LOCAL_STREAM_ID.to_owned(),
        ));
        peer_connection
            .add_track(Arc::clone(&local_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(RtcPeerTransport::map_err)?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Relay gathered candidates; in gather-first mode the orchestrator
        // has no signaling sink attached and simply drops them.
        let candidate_tx = events_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate_tx = candidate_tx.clone();
            Box::pin(async move {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(json) => {
                            let _ = candidate_tx
                                .send(PeerEvent::LocalCandidate(json.candidate))
                                .await;
                        }
                        Err(e) => warn!(target: "Media", "Failed to serialize candidate: {e}"),
                    }
                }
            })
        }));

        // Remote-track arrival is asynchronous and unordered with respect to
        // offer/answer completion; TrackBound is emitted at most once.
        let track_tx = events_tx.clone();
        let track_seen = Arc::new(AtomicBool::new(false));
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            let track_seen = track_seen.clone();
            Box::pin(async move {
                info!(target: "Media", "Remote track bound: {}", track.id());
                if !track_seen.swap(true, Ordering::SeqCst) {
                    let _ = track_tx.send(PeerEvent::TrackBound).await;
                }
            })
        }));

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                debug!(target: "Media", "Peer connection state: {state}");
                Box::pin(async {})
            },
        ));

        let transport = Arc::new(RtcPeerTransport {
            peer_connection,
            gather_before_offer: self.config.gather_before_offer,
            audio_enabled: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            events: events_tx,
        });
        Ok((transport, events_rx))
    }
}
