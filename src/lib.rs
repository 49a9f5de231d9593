//! voicelink: edge-device client for a voice assistant service
//!
//! Maintains a session with a remote speech/LLM server over a
//! message-oriented transport, multiplexing JSON control messages and
//! binary audio frames. The device is half-duplex: it never transmits
//! and plays voice audio at the same time, a rule enforced centrally by
//! the [`audio::StreamController`] rather than left to the hardware.
//!
//! The moving parts of a connected session:
//! - [`session::Client`] owns the device state machine and the session
//!   identity, and runs the inbound pump, the audio-send pump and the
//!   capture task
//! - [`protocol`] defines the wire schema and parses inbound control
//!   messages for the client's handlers
//! - [`transport`] and [`audio`] are capability boundaries with one
//!   configured backend each (websocket, cpal, opus)
//! - [`reconnect`] supplies backoff delays; the retry loop itself lives
//!   in the binary, not in the client

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod state;
pub mod transport;

pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use events::SessionEvent;
pub use reconnect::ExponentialBackoff;
pub use session::{Capabilities, Client, Status};
pub use state::{DeviceState, ListenMode};
