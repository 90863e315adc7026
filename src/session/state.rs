//! Session state machine.

use serde::Serialize;

/// Connection phase of one intercom session.
///
/// Owned exclusively by the orchestrator; mutated only through
/// [`SessionState::apply_transition`] on its owner task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub enum SessionState {
    /// No session; ready for a start-call request.
    #[default]
    Idle,
    /// Control-channel connect in flight.
    ControlConnecting,
    /// Control channel open, media not yet negotiated.
    ControlConnected,
    /// Offer/answer exchange in progress.
    MediaNegotiating,
    /// Audio transport established.
    MediaActive,
    /// Waiting for control channel and media session to finish closing.
    Closing,
    /// Both closed; about to reset to Idle.
    Closed,
    /// Session failed; carries a human-readable reason.
    Failed(String),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::MediaActive)
    }

    /// True once the control channel is open and addressing/identity frames
    /// can be processed.
    pub fn is_control_up(&self) -> bool {
        matches!(
            self,
            Self::ControlConnected | Self::MediaNegotiating | Self::MediaActive
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }
}

/// State transitions for a session.
#[derive(Debug, Clone)]
pub enum SessionTransition {
    StartRequested,
    ControlOpened,
    MediaNegotiationStarted,
    MediaNegotiated,
    StopRequested,
    ControlClosed,
    TeardownComplete,
    Failure(String),
    Reset,
}

impl SessionState {
    /// Apply a state transition. Returns error if the transition is invalid
    /// for the current state.
    pub fn apply_transition(
        &mut self,
        transition: SessionTransition,
    ) -> Result<(), InvalidTransition> {
        let new_state = match (&*self, transition) {
            (SessionState::Idle, SessionTransition::StartRequested) => {
                SessionState::ControlConnecting
            }
            (SessionState::ControlConnecting, SessionTransition::ControlOpened) => {
                SessionState::ControlConnected
            }
            (SessionState::ControlConnected, SessionTransition::MediaNegotiationStarted) => {
                SessionState::MediaNegotiating
            }
            (SessionState::MediaNegotiating, SessionTransition::MediaNegotiated) => {
                SessionState::MediaActive
            }
            (
                SessionState::ControlConnected
                | SessionState::MediaNegotiating
                | SessionState::MediaActive,
                SessionTransition::StopRequested | SessionTransition::ControlClosed,
            ) => SessionState::Closing,
            (SessionState::Closing, SessionTransition::TeardownComplete) => SessionState::Closed,
            (
                SessionState::ControlConnecting
                | SessionState::ControlConnected
                | SessionState::MediaNegotiating
                | SessionState::MediaActive
                | SessionState::Closing,
                SessionTransition::Failure(reason),
            ) => SessionState::Failed(reason),
            (SessionState::Closed | SessionState::Failed(_), SessionTransition::Reset) => {
                SessionState::Idle
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        *self = new_state;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Full happy-path flow:
    /// Idle → ControlConnecting → ControlConnected → MediaNegotiating →
    /// MediaActive → Closing → Closed → Idle
    #[test]
    fn test_full_call_flow() {
        let mut state = SessionState::default();
        assert_eq!(state, SessionState::Idle);

        state
            .apply_transition(SessionTransition::StartRequested)
            .unwrap();
        assert_eq!(state, SessionState::ControlConnecting);

        state
            .apply_transition(SessionTransition::ControlOpened)
            .unwrap();
        assert!(state.is_control_up());

        state
            .apply_transition(SessionTransition::MediaNegotiationStarted)
            .unwrap();
        state
            .apply_transition(SessionTransition::MediaNegotiated)
            .unwrap();
        assert!(state.is_active());

        state
            .apply_transition(SessionTransition::StopRequested)
            .unwrap();
        assert_eq!(state, SessionState::Closing);

        state
            .apply_transition(SessionTransition::TeardownComplete)
            .unwrap();
        assert!(state.is_terminal());

        // Closed auto-resets to Idle, ready for a new start-call request.
        state.apply_transition(SessionTransition::Reset).unwrap();
        assert_eq!(state, SessionState::Idle);
        assert!(
            state
                .apply_transition(SessionTransition::StartRequested)
                .is_ok()
        );
    }

    #[test]
    fn test_connect_failure() {
        let mut state = SessionState::Idle;
        state
            .apply_transition(SessionTransition::StartRequested)
            .unwrap();
        state
            .apply_transition(SessionTransition::Failure("connection refused".into()))
            .unwrap();
        assert_eq!(state, SessionState::Failed("connection refused".into()));

        state.apply_transition(SessionTransition::Reset).unwrap();
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn test_channel_drop_during_negotiation_reaches_closing() {
        let mut state = SessionState::MediaNegotiating;
        state
            .apply_transition(SessionTransition::ControlClosed)
            .unwrap();
        assert_eq!(state, SessionState::Closing);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        // Can't negotiate media before the control channel is up.
        let mut state = SessionState::Idle;
        assert!(
            state
                .apply_transition(SessionTransition::MediaNegotiationStarted)
                .is_err()
        );

        // Can't re-open an already-open channel.
        let mut state = SessionState::ControlConnected;
        assert!(
            state
                .apply_transition(SessionTransition::ControlOpened)
                .is_err()
        );

        // Terminal states only accept Reset.
        let mut state = SessionState::Closed;
        assert!(
            state
                .apply_transition(SessionTransition::StopRequested)
                .is_err()
        );
        assert!(state.apply_transition(SessionTransition::Reset).is_ok());
    }

    #[test]
    fn test_failure_carries_reason() {
        let mut state = SessionState::MediaNegotiating;
        state
            .apply_transition(SessionTransition::Failure("gateway returned 500".into()))
            .unwrap();
        match state {
            SessionState::Failed(reason) => assert_eq!(reason, "gateway returned 500"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
