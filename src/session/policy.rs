//! Addressing policy: maps an inbound addressing token to an audio-gate
//! decision.
//!
//! A pure decision table with no hidden state; identical inputs always yield
//! identical output. Called only once the device number is known and the
//! frame is not handshake traffic.

use serde::Serialize;

/// Token reserved for "addressed to everyone".
pub const TOKEN_BROADCAST: &str = "0";
/// Token reserved for "mute everyone".
pub const TOKEN_MUTE_ALL: &str = "-1";

/// Classification of an inbound addressing token against our assigned number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressingToken {
    /// `"0"`: the utterance is for all devices.
    Broadcast,
    /// `"-1"`: every device mutes.
    MuteAll,
    /// The token equals our assigned device number.
    TargetsSelf,
    /// A non-empty token addressing some other device.
    TargetsOther,
}

impl AddressingToken {
    /// Classify `token` against `assigned_number`. Total for every non-empty
    /// token; an empty token carries no addressing information.
    pub fn classify(token: &str, assigned_number: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        Some(match token {
            TOKEN_BROADCAST => Self::Broadcast,
            TOKEN_MUTE_ALL => Self::MuteAll,
            _ if token == assigned_number => Self::TargetsSelf,
            _ => Self::TargetsOther,
        })
    }
}

/// Whether the local audio track relays sound, and whether the corresponding
/// UI control is interactive. Two independent booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioGate {
    pub track_enabled: bool,
    pub control_enabled: bool,
}

impl Default for AudioGate {
    fn default() -> Self {
        Self {
            track_enabled: true,
            control_enabled: true,
        }
    }
}

impl AddressingToken {
    /// The audio-gate decision table.
    ///
    /// TargetsSelf is intentionally asymmetric: audio relays but the control
    /// locks, signaling "you are addressed and cannot self-mute while being
    /// addressed".
    pub fn gate(self) -> AudioGate {
        match self {
            Self::Broadcast => AudioGate {
                track_enabled: true,
                control_enabled: true,
            },
            Self::TargetsSelf => AudioGate {
                track_enabled: true,
                control_enabled: false,
            },
            Self::MuteAll => AudioGate {
                track_enabled: false,
                control_enabled: false,
            },
            Self::TargetsOther => AudioGate {
                track_enabled: false,
                control_enabled: true,
            },
        }
    }
}

/// Classify and decide in one step.
pub fn decide(token: &str, assigned_number: &str) -> Option<(AddressingToken, AudioGate)> {
    AddressingToken::classify(token, assigned_number).map(|t| (t, t.gate()))
}
