//! Session layer: state machine, identity handshake, addressing policy, and
//! the orchestrator that owns them.

pub mod events;
pub mod identity;
pub mod orchestrator;
pub mod policy;
pub mod state;

pub use events::EventBus;
pub use identity::{DeviceIdentity, IdentityBinder};
pub use orchestrator::SessionOrchestrator;
pub use policy::{AddressingToken, AudioGate};
pub use state::{SessionState, SessionTransition};
