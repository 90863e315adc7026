//! Typed event bus pushing session snapshots to the UI layer.
//!
//! The UI only ever reads these snapshots; it never calls back into
//! negotiation internals.

use crate::session::identity::DeviceIdentity;
use crate::session::policy::AudioGate;
use crate::session::state::SessionState;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    (state_changed, SessionState),
    (audio_gate_changed, AudioGate),
    (identity_changed, DeviceIdentity),
    (hardware_error, String),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
