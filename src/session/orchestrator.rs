//! Session orchestrator: the single owner of all session state.
//!
//! Every input — UI commands, control-channel events, peer-transport events,
//! negotiation completions, handshake timeouts — is funneled through one mpsc
//! queue and processed by one owner task, so state transitions are serialized
//! without any locking of the session state itself. Completions of spawned
//! work are tagged with the connection generation they belong to; completions
//! from a previous generation are discarded.

use crate::config::ClientConfig;
use crate::http::HttpClient;
use crate::media::peer::{PeerEvent, PeerTransport, PeerTransportFactory};
use crate::media::signaling::{SIGNAL_ANSWER, SIGNAL_CANDIDATE, SIGNAL_OFFER, SignalMessage};
use crate::media::{MediaSession, NegotiationMode, gateway};
use crate::session::events::EventBus;
use crate::session::identity::{HandshakeOutcome, IdentityBinder};
use crate::session::policy::{AudioGate, decide};
use crate::session::state::{SessionState, SessionTransition};
use crate::socket::{
    CLOSE_CODE_NORMAL, ControlEvent, ControlSocket, ControlTransportFactory, SocketError,
};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::RwLock;

const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// Everything the owner task reacts to, commands and completions alike.
enum OrchestratorEvent {
    StartCall,
    StopCall,
    ToggleLocalAudio,
    TagDiscovered(String),
    HardwareError(String),
    ControlReady {
        generation: u64,
        events: Receiver<ControlEvent>,
    },
    ControlFailed {
        generation: u64,
        reason: String,
    },
    Control {
        generation: u64,
        event: ControlEvent,
    },
    MediaReady {
        generation: u64,
        transport: Arc<dyn PeerTransport>,
        events: Receiver<PeerEvent>,
    },
    MediaFailed {
        generation: u64,
        reason: String,
    },
    Negotiated {
        generation: u64,
    },
    NegotiationFailed {
        generation: u64,
        reason: String,
    },
    Peer {
        generation: u64,
        event: PeerEvent,
    },
    HandshakeTimeout {
        generation: u64,
    },
    Shutdown,
}

/// Public handle to the session owner task.
pub struct SessionOrchestrator {
    commands: Sender<OrchestratorEvent>,
    events: Arc<EventBus>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionOrchestrator {
    pub fn new(
        config: ClientConfig,
        control_factory: Arc<dyn ControlTransportFactory>,
        peer_factory: Arc<dyn PeerTransportFactory>,
        http: Arc<dyn HttpClient>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let events = Arc::new(EventBus::new());
        let state = Arc::new(RwLock::new(SessionState::Idle));

        let owner = OwnerTask {
            config,
            control: Arc::new(ControlSocket::new(control_factory)),
            peer_factory,
            http,
            events: events.clone(),
            shared_state: state.clone(),
            self_tx: tx.clone(),
            state: SessionState::Idle,
            generation: 0,
            binder: IdentityBinder::new(),
            gate: AudioGate::default(),
            local_audio_on: true,
            pending_uid: None,
            pending_remote_offer: None,
            pending_remote_candidates: Vec::new(),
            media: None,
            media_creating: false,
            stop_pending: false,
        };
        tokio::spawn(owner.run(rx));

        Arc::new(Self {
            commands: tx,
            events,
            state,
        })
    }

    /// Current session state snapshot.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Event bus carrying state, gate, and identity snapshots for the UI.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Begin a session: connect the control channel and (per configuration)
    /// negotiate media. No-op while a session is already running.
    pub async fn start_call(&self) {
        self.post(OrchestratorEvent::StartCall).await;
    }

    /// Tear the session down in an orderly fashion.
    pub async fn stop_call(&self) {
        self.post(OrchestratorEvent::StopCall).await;
    }

    /// A proximity card was read; run (or queue) the identity handshake.
    pub async fn tag_discovered(&self, raw_id: &[u8]) {
        let uid = crate::hardware::encode_card_uid(raw_id);
        self.post(OrchestratorEvent::TagDiscovered(uid)).await;
    }

    /// Flip the user's own mute toggle. Ignored while the addressing policy
    /// has locked the control.
    pub async fn toggle_local_audio(&self) {
        self.post(OrchestratorEvent::ToggleLocalAudio).await;
    }

    /// Surface a non-fatal hardware failure to the UI.
    pub async fn report_hardware_error(&self, message: String) {
        self.post(OrchestratorEvent::HardwareError(message)).await;
    }

    /// Stop the owner task, tearing down any live session.
    pub async fn shutdown(&self) {
        self.post(OrchestratorEvent::Shutdown).await;
    }

    async fn post(&self, event: OrchestratorEvent) {
        if self.commands.send(event).await.is_err() {
            warn!(target: "Orchestrator", "Owner task is gone, dropping command");
        }
    }
}

/// The owner task's state. Exclusively owned; no field needs a lock.
struct OwnerTask {
    config: ClientConfig,
    control: Arc<ControlSocket>,
    peer_factory: Arc<dyn PeerTransportFactory>,
    http: Arc<dyn HttpClient>,
    events: Arc<EventBus>,
    shared_state: Arc<RwLock<SessionState>>,
    self_tx: Sender<OrchestratorEvent>,

    state: SessionState,
    /// Bumped on every start-call; events tagged with an older value are
    /// leftovers of a torn-down connection and are discarded.
    generation: u64,
    binder: IdentityBinder,
    gate: AudioGate,
    /// The user's own mute toggle, ANDed with the policy gate.
    local_audio_on: bool,
    /// Card UID read while the control channel was down; replayed once on
    /// the next connect.
    pending_uid: Option<String>,
    /// Remote offer that arrived before our peer transport existed.
    pending_remote_offer: Option<String>,
    /// Remote candidates that arrived before our peer transport existed.
    pending_remote_candidates: Vec<String>,
    media: Option<MediaSession>,
    media_creating: bool,
    /// Stop requested while the connect was still in flight.
    stop_pending: bool,
}

impl OwnerTask {
    async fn run(mut self, mut rx: Receiver<OrchestratorEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                OrchestratorEvent::StartCall => self.handle_start().await,
                OrchestratorEvent::StopCall => self.handle_stop().await,
                OrchestratorEvent::ToggleLocalAudio => self.handle_toggle().await,
                OrchestratorEvent::TagDiscovered(uid) => self.handle_tag(uid).await,
                OrchestratorEvent::HardwareError(message) => {
                    let _ = self.events.hardware_error.send(message);
                }
                OrchestratorEvent::ControlReady { generation, events } => {
                    self.handle_control_ready(generation, events);
                }
                OrchestratorEvent::ControlFailed { generation, reason } => {
                    if self.is_current(generation, "control connect failure") {
                        self.fail(reason).await;
                    }
                }
                OrchestratorEvent::Control { generation, event } => {
                    if self.is_current(generation, "control event") {
                        self.handle_control_event(event).await;
                    }
                }
                OrchestratorEvent::MediaReady {
                    generation,
                    transport,
                    events,
                } => {
                    if self.is_current(generation, "media transport") {
                        self.handle_media_ready(transport, events).await;
                    } else {
                        let _ = transport.close().await;
                    }
                }
                OrchestratorEvent::MediaFailed { generation, reason }
                | OrchestratorEvent::NegotiationFailed { generation, reason } => {
                    if self.is_current(generation, "negotiation failure") {
                        self.media_creating = false;
                        self.fail(reason).await;
                    }
                }
                OrchestratorEvent::Negotiated { generation } => {
                    if self.is_current(generation, "negotiation completion") {
                        self.handle_negotiated().await;
                    }
                }
                OrchestratorEvent::Peer { generation, event } => {
                    if self.is_current(generation, "peer event") {
                        self.handle_peer_event(event).await;
                    }
                }
                OrchestratorEvent::HandshakeTimeout { generation } => {
                    if self.is_current(generation, "handshake timeout")
                        && self.binder.awaiting_response()
                        && self.state.is_control_up()
                    {
                        self.fail("identity handshake timed out".to_string()).await;
                    }
                }
                OrchestratorEvent::Shutdown => break,
            }
        }

        self.close_media().await;
        self.control.close(CLOSE_CODE_NORMAL, "client shutdown").await;
        info!(target: "Orchestrator", "Owner task stopped");
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        if generation == self.generation {
            true
        } else {
            debug!(
                target: "Orchestrator",
                "Discarding stale {what} (generation {generation}, current {})",
                self.generation
            );
            false
        }
    }

    async fn handle_start(&mut self) {
        if self.state.is_terminal() {
            self.transition(SessionTransition::Reset).await;
        }
        if self.state != SessionState::Idle {
            warn!(target: "Orchestrator", "Start requested while session already running, ignoring");
            return;
        }

        self.generation += 1;
        self.stop_pending = false;
        self.transition(SessionTransition::StartRequested).await;

        let generation = self.generation;
        let url = self.config.control_url.clone();
        let tx = self.self_tx.clone();
        // The dial runs off-task so the event loop keeps draining while the
        // connection is in flight.
        let control = self.control.clone();
        tokio::spawn(async move {
            let event = match control.open(&url).await {
                Ok(Some(events)) => OrchestratorEvent::ControlReady { generation, events },
                // Every teardown path resets the socket, so a held connection
                // here is an inconsistency; fail loudly rather than leaving
                // the session parked in ControlConnecting.
                Ok(None) => OrchestratorEvent::ControlFailed {
                    generation,
                    reason: "control channel already connected".to_string(),
                },
                Err(e) => OrchestratorEvent::ControlFailed {
                    generation,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    fn handle_control_ready(&mut self, generation: u64, mut events: Receiver<ControlEvent>) {
        if !self.is_current(generation, "control connection") {
            return;
        }
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx
                    .send(OrchestratorEvent::Control { generation, event })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        });
    }

    async fn handle_control_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Opened => {
                self.transition(SessionTransition::ControlOpened).await;
                if self.stop_pending {
                    self.stop_pending = false;
                    self.initiate_stop().await;
                    return;
                }
                if let Some(uid) = self.pending_uid.take() {
                    info!(target: "Orchestrator", "Replaying queued card UID");
                    self.send_uid(uid).await;
                }
                if self.config.auto_negotiate_on_connect {
                    self.begin_media().await;
                }
            }
            ControlEvent::Frame(frame) => self.handle_frame(frame).await,
            ControlEvent::Closed { code, reason } => {
                info!(target: "Orchestrator", "Control channel closed ({code}): {reason}");
                self.control.reset().await;
                match &self.state {
                    SessionState::Closing => self.complete_teardown().await,
                    s if s.is_control_up() => {
                        self.transition(SessionTransition::ControlClosed).await;
                        self.complete_teardown().await;
                    }
                    SessionState::ControlConnecting => {
                        self.fail(format!("control channel closed during connect: {reason}"))
                            .await;
                    }
                    _ => {}
                }
            }
            ControlEvent::Failed(reason) => {
                self.control.reset().await;
                if self.state == SessionState::Closing {
                    // Already tearing down; an error on the dying connection
                    // is not a session failure.
                    self.complete_teardown().await;
                } else {
                    self.fail(reason).await;
                }
            }
        }
    }

    /// Route one inbound control frame: signaling envelope, then identity
    /// handshake, then addressing policy.
    async fn handle_frame(&mut self, frame: String) {
        if !self.state.is_control_up() {
            debug!(target: "Orchestrator", "Frame while control not up, dropping: {frame}");
            return;
        }

        if let Some(signal) = SignalMessage::parse(&frame) {
            self.handle_signal(signal).await;
            return;
        }

        match self.binder.interpret(&frame) {
            HandshakeOutcome::NumberAssigned(number) => {
                info!(target: "Orchestrator", "Device number assigned: {number}");
                let _ = self.events.identity_changed.send(self.binder.identity().clone());
                if !self.config.auto_negotiate_on_connect {
                    self.begin_media().await;
                }
            }
            HandshakeOutcome::NameAssigned(_) => {
                let _ = self.events.identity_changed.send(self.binder.identity().clone());
            }
            HandshakeOutcome::NotHandshakeTraffic => self.handle_addressing(&frame).await,
        }
    }

    async fn handle_addressing(&mut self, token: &str) {
        let number = match self.binder.identity().assigned_number.clone() {
            Some(number) => number,
            None => {
                debug!(target: "Orchestrator", "Addressing token before identity bound, ignoring: {token}");
                return;
            }
        };
        match decide(token, &number) {
            Some((classified, gate)) => {
                debug!(target: "Orchestrator", "Token {token:?} classified {classified:?} -> {gate:?}");
                self.gate = gate;
                let _ = self.events.audio_gate_changed.send(gate);
                self.apply_effective_gate().await;
            }
            None => {
                debug!(target: "Orchestrator", "Empty addressing token, ignoring");
            }
        }
    }

    async fn handle_signal(&mut self, signal: SignalMessage) {
        match signal.kind.as_str() {
            SIGNAL_OFFER => {
                if self.media.is_some() {
                    self.answer_offer(signal.data).await;
                } else {
                    self.pending_remote_offer = Some(signal.data);
                    self.begin_media().await;
                }
            }
            SIGNAL_ANSWER => {
                let transport = match &self.media {
                    Some(media) => media.transport(),
                    None => {
                        warn!(target: "Orchestrator", "Answer frame without a media session, dropping");
                        return;
                    }
                };
                match transport.set_remote_answer(&signal.data).await {
                    Ok(()) => self.handle_negotiated().await,
                    Err(e) => self.fail(e.to_string()).await,
                }
            }
            SIGNAL_CANDIDATE => {
                if let Some(media) = &self.media {
                    if let Err(e) = media.transport().add_remote_candidate(&signal.data).await {
                        warn!(target: "Orchestrator", "Failed to apply remote candidate: {e}");
                    }
                } else {
                    self.pending_remote_candidates.push(signal.data);
                }
            }
            other => {
                warn!(target: "Orchestrator", "Unknown signaling kind {other:?}, dropping");
            }
        }
    }

    async fn answer_offer(&mut self, remote_offer: String) {
        let transport = match &self.media {
            Some(media) => media.transport(),
            None => return,
        };
        match transport.create_answer(&remote_offer).await {
            Ok(answer) => {
                let frame = SignalMessage::answer(answer).encode();
                if let Err(e) = self.control.send(&frame).await {
                    self.fail(format!("failed to send answer: {e}")).await;
                    return;
                }
                self.handle_negotiated().await;
            }
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    /// Create the peer transport for this session. At most one media session
    /// exists per control connection; duplicate requests are dropped.
    async fn begin_media(&mut self) {
        if self.media.is_some() || self.media_creating {
            debug!(target: "Orchestrator", "Media session already present, not creating another");
            return;
        }
        if self.state != SessionState::ControlConnected {
            debug!(target: "Orchestrator", "Not ready for media negotiation in {:?}", self.state);
            return;
        }
        self.media_creating = true;
        self.transition(SessionTransition::MediaNegotiationStarted)
            .await;

        let generation = self.generation;
        let factory = self.peer_factory.clone();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let event = match factory.create().await {
                Ok((transport, events)) => OrchestratorEvent::MediaReady {
                    generation,
                    transport,
                    events,
                },
                Err(e) => OrchestratorEvent::MediaFailed {
                    generation,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    async fn handle_media_ready(
        &mut self,
        transport: Arc<dyn PeerTransport>,
        mut events: Receiver<PeerEvent>,
    ) {
        self.media_creating = false;
        self.media = Some(MediaSession::new(transport.clone()));

        let generation = self.generation;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx
                    .send(OrchestratorEvent::Peer { generation, event })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        });

        for candidate in std::mem::take(&mut self.pending_remote_candidates) {
            if let Err(e) = transport.add_remote_candidate(&candidate).await {
                warn!(target: "Orchestrator", "Failed to apply buffered candidate: {e}");
            }
        }

        if let Some(offer) = self.pending_remote_offer.take() {
            self.answer_offer(offer).await;
            return;
        }

        match self.config.negotiation.clone() {
            NegotiationMode::HttpGateway { url } => {
                let http = self.http.clone();
                let tx = self.self_tx.clone();
                tokio::spawn(async move {
                    let event = match gateway::negotiate_via_gateway(&transport, &http, &url).await
                    {
                        Ok(()) => OrchestratorEvent::Negotiated { generation },
                        Err(e) => OrchestratorEvent::NegotiationFailed {
                            generation,
                            reason: e.to_string(),
                        },
                    };
                    let _ = tx.send(event).await;
                });
            }
            NegotiationMode::PeerToPeer => match transport.create_offer().await {
                Ok(offer) => {
                    let frame = SignalMessage::offer(offer).encode();
                    if let Err(e) = self.control.send(&frame).await {
                        self.fail(format!("failed to send offer: {e}")).await;
                    }
                }
                Err(e) => self.fail(e.to_string()).await,
            },
        }
    }

    async fn handle_negotiated(&mut self) {
        if self.state != SessionState::MediaNegotiating {
            debug!(target: "Orchestrator", "Negotiation completed in {:?}, ignoring", self.state);
            return;
        }
        self.transition(SessionTransition::MediaNegotiated).await;
        self.apply_effective_gate().await;
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::TrackBound => {
                if let Some(media) = &mut self.media {
                    if let Err(e) = media.mark_track_bound().await {
                        warn!(target: "Orchestrator", "Failed to apply buffered gate: {e}");
                    }
                }
                self.apply_effective_gate().await;
            }
            PeerEvent::LocalCandidate(candidate) => {
                if matches!(self.config.negotiation, NegotiationMode::PeerToPeer) {
                    let frame = SignalMessage::candidate(candidate).encode();
                    match self.control.send(&frame).await {
                        Ok(()) | Err(SocketError::NotConnected) => {}
                        Err(e) => {
                            warn!(target: "Orchestrator", "Failed to relay candidate: {e}")
                        }
                    }
                }
            }
            PeerEvent::Closed => {
                let initiated = self.media.as_ref().map(MediaSession::is_closed);
                if initiated == Some(false)
                    && matches!(
                        self.state,
                        SessionState::MediaNegotiating | SessionState::MediaActive
                    )
                {
                    self.fail("media transport closed unexpectedly".to_string())
                        .await;
                }
            }
        }
    }

    async fn handle_tag(&mut self, uid: String) {
        if uid.is_empty() {
            debug!(target: "Orchestrator", "Empty card UID, ignoring");
            return;
        }
        if self.state.is_control_up() {
            self.send_uid(uid).await;
        } else {
            info!(target: "Orchestrator", "Control channel down, queueing card UID");
            self.pending_uid = Some(uid);
        }
    }

    async fn send_uid(&mut self, uid: String) {
        let frame = match self.binder.begin_handshake(&uid) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(target: "Orchestrator", "{e}, dropping card UID");
                return;
            }
        };
        if let Err(e) = self.control.send(&frame).await {
            warn!(target: "Orchestrator", "Failed to send card UID: {e}");
            return;
        }

        let generation = self.generation;
        let timeout = self.config.handshake_timeout;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx
                .send(OrchestratorEvent::HandshakeTimeout { generation })
                .await;
        });
    }

    async fn handle_toggle(&mut self) {
        if !self.gate.control_enabled {
            debug!(target: "Orchestrator", "Audio control locked by addressing policy, ignoring toggle");
            return;
        }
        self.local_audio_on = !self.local_audio_on;
        info!(target: "Orchestrator", "Local audio toggle: {}", self.local_audio_on);
        self.apply_effective_gate().await;
    }

    /// Push the effective track state to the media session: the policy gate
    /// ANDed with the user's own toggle.
    async fn apply_effective_gate(&mut self) {
        let enabled = self.gate.track_enabled && self.local_audio_on;
        if let Some(media) = &mut self.media {
            if let Err(e) = media.set_audio_enabled(enabled).await {
                warn!(target: "Orchestrator", "Failed to apply audio gate: {e}");
            }
        }
    }

    async fn handle_stop(&mut self) {
        match &self.state {
            SessionState::ControlConnecting => {
                info!(target: "Orchestrator", "Stop requested mid-connect, deferring until open");
                self.stop_pending = true;
            }
            s if s.is_control_up() => self.initiate_stop().await,
            _ => {
                debug!(target: "Orchestrator", "Stop requested in {:?}, nothing to do", self.state);
            }
        }
    }

    async fn initiate_stop(&mut self) {
        self.transition(SessionTransition::StopRequested).await;
        self.close_media().await;
        // Teardown completes when the transport reports Closed.
        self.control.close(CLOSE_CODE_NORMAL, "client stop").await;
    }

    async fn close_media(&mut self) {
        self.media_creating = false;
        if let Some(mut media) = self.media.take() {
            if let Err(e) = media.close().await {
                warn!(target: "Orchestrator", "Error closing media session: {e}");
            }
        }
        self.pending_remote_offer = None;
        self.pending_remote_candidates.clear();
    }

    /// Both channels are down: reach Closed, wipe per-connection state, and
    /// return to Idle ready for the next start-call.
    async fn complete_teardown(&mut self) {
        self.close_media().await;
        self.transition(SessionTransition::TeardownComplete).await;
        self.reset_connection_state().await;
        self.transition(SessionTransition::Reset).await;
    }

    /// Tear everything down, surface Failed with the reason, and auto-reset
    /// to Idle ready for the next start-call.
    async fn fail(&mut self, reason: String) {
        warn!(target: "Orchestrator", "Session failed: {reason}");
        self.close_media().await;
        self.control.close(CLOSE_CODE_NORMAL, "session failure").await;
        self.control.reset().await;
        self.reset_connection_state().await;
        self.transition(SessionTransition::Failure(reason)).await;
        self.transition(SessionTransition::Reset).await;
    }

    /// Wipe identity and gate state tied to the dead connection and tell the
    /// UI about it.
    async fn reset_connection_state(&mut self) {
        self.binder.reset();
        let _ = self.events.identity_changed.send(self.binder.identity().clone());
        if self.gate != AudioGate::default() {
            self.gate = AudioGate::default();
            let _ = self.events.audio_gate_changed.send(self.gate);
        }
        self.local_audio_on = true;
        self.stop_pending = false;
    }

    async fn transition(&mut self, transition: SessionTransition) {
        if let Err(e) = self.state.apply_transition(transition) {
            warn!(target: "Orchestrator", "{e}");
            return;
        }
        debug!(target: "Orchestrator", "Session state -> {:?}", self.state);
        *self.shared_state.write().await = self.state.clone();
        let _ = self.events.state_changed.send(self.state.clone());
    }
}
