//! Push-to-talk intercom client.
//!
//! The core of this crate is the session orchestrator: a single-owner state
//! machine that opens a websocket control channel, negotiates a WebRTC audio
//! session (peer-to-peer or via an HTTP media gateway), binds a proximity-card
//! UID to the session through a two-phase handshake, and gates the local audio
//! output according to addressing tokens received on the control channel.
//!
//! UI, NFC dispatch, and device audio routing are external collaborators; they
//! talk to the orchestrator only through [`session::SessionOrchestrator`]
//! commands and the [`session::events::EventBus`] snapshots.

pub mod config;
pub mod hardware;
pub mod http;
pub mod media;
pub mod session;
pub mod socket;

pub use config::ClientConfig;
pub use session::SessionOrchestrator;
pub use session::policy::{AddressingToken, AudioGate};
pub use session::state::SessionState;
