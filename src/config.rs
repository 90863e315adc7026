use crate::media::NegotiationMode;
use std::time::Duration;

/// Static configuration for one intercom client instance.
///
/// The negotiation profile (`auto_negotiate_on_connect`) is fixed per
/// deployment: either media negotiation starts as soon as the control channel
/// opens, or only once the server has confirmed our device identity.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Websocket endpoint of the control channel, e.g. `ws://192.168.0.36:80`.
    pub control_url: String,
    /// How the audio transport session is negotiated.
    pub negotiation: NegotiationMode,
    /// Start media negotiation immediately on control-channel connect instead
    /// of waiting for the identity handshake to complete.
    pub auto_negotiate_on_connect: bool,
    /// How long to wait for the server's identity response after sending a
    /// card UID before the session is failed.
    pub handshake_timeout: Duration,
}

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

impl ClientConfig {
    pub fn new(control_url: impl Into<String>, negotiation: NegotiationMode) -> Self {
        Self {
            control_url: control_url.into(),
            negotiation,
            auto_negotiate_on_connect: true,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}
