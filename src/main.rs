use clap::Parser;
use intercom_client::config::ClientConfig;
use intercom_client::http::UreqHttpClient;
use intercom_client::media::NegotiationMode;
use intercom_client::media::webrtc::{RtcConfig, RtcPeerTransportFactory};
use intercom_client::session::SessionOrchestrator;
use intercom_client::socket::WebSocketTransportFactory;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Push-to-talk intercom client.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Websocket endpoint of the control channel.
    #[arg(long, default_value = "ws://192.168.0.36:80")]
    url: String,

    /// HTTP media gateway base URL. When omitted, media is negotiated
    /// peer-to-peer over the control channel.
    #[arg(long)]
    gateway: Option<String>,

    /// STUN server host for ICE gathering, e.g. 192.168.0.36.
    #[arg(long)]
    stun: Option<String>,

    /// Wait for the identity handshake before negotiating media instead of
    /// negotiating as soon as the control channel opens.
    #[arg(long)]
    negotiate_after_identity: bool,

    /// Identity handshake timeout in seconds.
    #[arg(long, default_value_t = 10)]
    handshake_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let negotiation = match &args.gateway {
        Some(url) => NegotiationMode::HttpGateway { url: url.clone() },
        None => NegotiationMode::PeerToPeer,
    };
    let mut config = ClientConfig::new(&args.url, negotiation);
    config.auto_negotiate_on_connect = !args.negotiate_after_identity;
    config.handshake_timeout = Duration::from_secs(args.handshake_timeout);

    let rtc_config = RtcConfig {
        stun_server: args.stun.as_ref().map(|host| format!("stun:{host}:3478")),
        // Gateway negotiation is a single POST, so all candidates must ride
        // in the offer; p2p signaling trickles them instead.
        gather_before_offer: args.gateway.is_some(),
    };

    let orchestrator = SessionOrchestrator::new(
        config,
        Arc::new(WebSocketTransportFactory),
        Arc::new(RtcPeerTransportFactory::new(rtc_config)),
        Arc::new(UreqHttpClient::new()),
    );

    spawn_event_logger(&orchestrator);

    info!("Commands: start | stop | tag <hex uid> | audio | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !dispatch(&orchestrator, line.trim()).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    orchestrator.stop_call().await;
    orchestrator.shutdown().await;
    Ok(())
}

async fn dispatch(orchestrator: &Arc<SessionOrchestrator>, line: &str) -> bool {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "start" => orchestrator.start_call().await,
        "stop" => orchestrator.stop_call().await,
        "audio" => orchestrator.toggle_local_audio().await,
        "tag" => match hex::decode(rest) {
            Ok(raw_id) => orchestrator.tag_discovered(&raw_id).await,
            Err(e) => error!("Invalid card UID {rest:?}: {e}"),
        },
        "quit" | "exit" => return false,
        "" => {}
        other => error!("Unknown command: {other}"),
    }
    true
}

/// Print every bus snapshot, standing in for the UI layer.
fn spawn_event_logger(orchestrator: &Arc<SessionOrchestrator>) {
    let mut state_rx = orchestrator.events().state_changed.subscribe();
    let mut gate_rx = orchestrator.events().audio_gate_changed.subscribe();
    let mut identity_rx = orchestrator.events().identity_changed.subscribe();
    let mut hardware_rx = orchestrator.events().hardware_error.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(state) = state_rx.recv() => info!("Session state: {state:?}"),
                Ok(gate) = gate_rx.recv() => info!(
                    "Audio gate: track={} control={}",
                    gate.track_enabled, gate.control_enabled
                ),
                Ok(identity) = identity_rx.recv() => info!(
                    "Identity: number={:?} name={:?}",
                    identity.assigned_number, identity.display_name
                ),
                Ok(message) = hardware_rx.recv() => error!("Hardware: {message}"),
                else => break,
            }
        }
    });
}
