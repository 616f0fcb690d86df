//! Callbridge Core Library
//!
//! This crate relays audio between a telephony call leg (or a local audio
//! device) and a conversational voice-agent session, including the session
//! state machine, interruption handling, transport framing, and telemetry.

pub mod audio;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod telemetry;
pub mod transport;

pub(crate) mod util;

pub use error::RelayError;
