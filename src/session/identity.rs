//! Identity binder: the two-phase "assign my device number" handshake.
//!
//! Outbound: `"UID:" + <uppercase hex card id>`. Inbound: the number
//! assignment is a raw token with no prefix, so it is only recognizable while
//! the handshake is pending; the display-name assignment carries the reserved
//! `"FIO:"` tag and may arrive at any point.

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

/// Outbound identity frame prefix.
pub const UID_PREFIX: &str = "UID:";
/// Reserved 4-character tag marking a display-name assignment.
pub const NAME_PREFIX: &str = "FIO:";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity handshake already started for this connection")]
    HandshakeAlreadyStarted,
}

/// Server-assigned identity of this device. Set once per control-channel
/// connection; cleared when the channel disconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub assigned_number: Option<String>,
    pub display_name: Option<String>,
}

impl DeviceIdentity {
    pub fn is_bound(&self) -> bool {
        self.assigned_number.is_some()
    }
}

/// Outcome of interpreting one inbound control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    NumberAssigned(String),
    NameAssigned(String),
    /// Ordinary addressing traffic, not part of the handshake.
    NotHandshakeTraffic,
}

/// Runs the identity handshake for one control-channel connection.
#[derive(Debug, Default)]
pub struct IdentityBinder {
    identity: DeviceIdentity,
    awaiting_identity_response: bool,
    handshake_started: bool,
}

impl IdentityBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_identity_response
    }

    /// Build the outbound UID frame and mark the handshake as pending.
    /// At most one handshake per connection.
    pub fn begin_handshake(&mut self, uid: &str) -> Result<String, IdentityError> {
        if self.handshake_started {
            return Err(IdentityError::HandshakeAlreadyStarted);
        }
        self.handshake_started = true;
        self.awaiting_identity_response = true;
        Ok(format!("{UID_PREFIX}{uid}"))
    }

    /// Interpret one inbound frame.
    ///
    /// The pending flag is cleared by the next interpretable frame no matter
    /// what it is: a tagged name assignment, the raw number assignment, or —
    /// when the server skips the handshake — an ordinary addressing token
    /// that then gets bound as our number. That last case is a defined race,
    /// not an error.
    pub fn interpret(&mut self, frame: &str) -> HandshakeOutcome {
        if let Some(name) = frame.strip_prefix(NAME_PREFIX) {
            self.awaiting_identity_response = false;
            self.identity.display_name = Some(name.to_string());
            debug!(target: "Identity", "Display name assigned: {name}");
            return HandshakeOutcome::NameAssigned(name.to_string());
        }

        if self.awaiting_identity_response {
            self.awaiting_identity_response = false;
            if self.identity.assigned_number.is_none() {
                self.identity.assigned_number = Some(frame.to_string());
                debug!(target: "Identity", "Device number assigned: {frame}");
                return HandshakeOutcome::NumberAssigned(frame.to_string());
            }
            // Number already known; a stale pending flag never rebinds it.
            warn!(target: "Identity", "Identity response after number already bound, treating as addressing");
        }

        HandshakeOutcome::NotHandshakeTraffic
    }

    /// Forget everything tied to the current connection.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: UID sent, server replies number then tagged name.
    #[test]
    fn test_number_then_name_assignment() {
        let mut binder = IdentityBinder::new();

        let frame = binder.begin_handshake("04A1B2C3").unwrap();
        assert_eq!(frame, "UID:04A1B2C3");
        assert!(binder.awaiting_response());

        assert_eq!(
            binder.interpret("7"),
            HandshakeOutcome::NumberAssigned("7".into())
        );
        assert!(!binder.awaiting_response());

        assert_eq!(
            binder.interpret("FIO:Ivan Petrov"),
            HandshakeOutcome::NameAssigned("Ivan Petrov".into())
        );

        let identity = binder.identity();
        assert_eq!(identity.assigned_number.as_deref(), Some("7"));
        assert_eq!(identity.display_name.as_deref(), Some("Ivan Petrov"));
        assert!(identity.is_bound());
    }

    /// A tagged name frame arriving first clears the pending flag; the next
    /// raw frame is then ordinary traffic, not a number assignment.
    #[test]
    fn test_name_first_clears_pending_flag() {
        let mut binder = IdentityBinder::new();
        binder.begin_handshake("04A1B2C3").unwrap();

        assert_eq!(
            binder.interpret("FIO:Ivan Petrov"),
            HandshakeOutcome::NameAssigned("Ivan Petrov".into())
        );
        assert!(!binder.awaiting_response());

        assert_eq!(binder.interpret("3"), HandshakeOutcome::NotHandshakeTraffic);
        assert!(binder.identity().assigned_number.is_none());
    }

    /// While no handshake is pending, raw frames are ordinary traffic.
    #[test]
    fn test_frames_before_handshake_are_not_interpreted() {
        let mut binder = IdentityBinder::new();
        assert_eq!(binder.interpret("5"), HandshakeOutcome::NotHandshakeTraffic);
        assert!(binder.identity().assigned_number.is_none());
    }

    /// The flag is consumed by exactly one frame: a second raw frame after
    /// the number assignment is addressing traffic.
    #[test]
    fn test_flag_cleared_after_single_frame() {
        let mut binder = IdentityBinder::new();
        binder.begin_handshake("AA").unwrap();

        assert_eq!(
            binder.interpret("12"),
            HandshakeOutcome::NumberAssigned("12".into())
        );
        assert_eq!(
            binder.interpret("12"),
            HandshakeOutcome::NotHandshakeTraffic
        );
    }

    #[test]
    fn test_second_handshake_rejected() {
        let mut binder = IdentityBinder::new();
        binder.begin_handshake("AA").unwrap();
        assert!(matches!(
            binder.begin_handshake("BB"),
            Err(IdentityError::HandshakeAlreadyStarted)
        ));
    }

    #[test]
    fn test_reset_clears_identity_and_allows_new_handshake() {
        let mut binder = IdentityBinder::new();
        binder.begin_handshake("AA").unwrap();
        binder.interpret("7");

        binder.reset();
        assert_eq!(binder.identity(), &DeviceIdentity::default());
        assert!(binder.begin_handshake("BB").is_ok());
    }
}
