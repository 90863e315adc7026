//! Peer-to-peer signaling envelope carried as control-channel frames.

use serde::{Deserialize, Serialize};

pub const SIGNAL_OFFER: &str = "offer";
pub const SIGNAL_ANSWER: &str = "answer";
pub const SIGNAL_CANDIDATE: &str = "candidate";

/// JSON envelope for offer/answer/candidate frames: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl SignalMessage {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SIGNAL_OFFER.to_string(),
            data: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SIGNAL_ANSWER.to_string(),
            data: sdp.into(),
        }
    }

    pub fn candidate(candidate: impl Into<String>) -> Self {
        Self {
            kind: SIGNAL_CANDIDATE.to_string(),
            data: candidate.into(),
        }
    }

    /// Try to parse a control frame as a signaling envelope. Addressing and
    /// identity frames are plain tokens, so anything that is not a JSON
    /// object with the expected shape is simply not signaling traffic.
    pub fn parse(frame: &str) -> Option<Self> {
        if !frame.trim_start().starts_with('{') {
            return None;
        }
        serde_json::from_str(frame).ok()
    }

    pub fn encode(&self) -> String {
        // Struct of two strings; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let msg = SignalMessage::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1");
        let parsed = SignalMessage::parse(&msg.encode()).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.kind, SIGNAL_OFFER);
    }

    #[test]
    fn test_plain_tokens_are_not_signaling() {
        assert!(SignalMessage::parse("0").is_none());
        assert!(SignalMessage::parse("-1").is_none());
        assert!(SignalMessage::parse("FIO:Ivan Petrov").is_none());
        assert!(SignalMessage::parse("7").is_none());
    }

    #[test]
    fn test_malformed_json_is_not_signaling() {
        assert!(SignalMessage::parse("{not json").is_none());
        assert!(SignalMessage::parse(r#"{"kind":"offer"}"#).is_none());
    }
}
