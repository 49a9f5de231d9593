//! Session event surface
//!
//! Structured events broadcast by the orchestrator so external observers
//! (health checks, a future UI) can follow the session without touching
//! its internals.

use serde::{Deserialize, Serialize};

use crate::state::DeviceState;

/// Events emitted by the session orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The device state changed
    StateChanged { from: DeviceState, to: DeviceState },

    /// The server acknowledged the hello handshake with a session id
    SessionEstablished { session_id: String },

    /// The server detected the wake word
    WakeWordDetected { text: String },

    /// Speech-to-text result for the current utterance
    TranscriptReceived { session_id: String, text: String },

    /// Assistant reply text, with the emotion tag the server attached
    AssistantReply {
        session_id: String,
        text: String,
        emotion: String,
    },

    /// The server reported an error for this session
    ServerError { session_id: String, message: String },

    /// The transport receive queue closed; the session is over
    ConnectionLost,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::StateChanged { from, to } => {
                write!(f, "STATE_CHANGED ({from} -> {to})")
            }
            SessionEvent::SessionEstablished { session_id } => {
                write!(f, "SESSION_ESTABLISHED ({session_id})")
            }
            SessionEvent::WakeWordDetected { text } => {
                write!(f, "WAKE_WORD_DETECTED ({text})")
            }
            SessionEvent::TranscriptReceived { text, .. } => {
                write!(f, "TRANSCRIPT_RECEIVED ({text})")
            }
            SessionEvent::AssistantReply { text, emotion, .. } => {
                write!(f, "ASSISTANT_REPLY ({text}, {emotion})")
            }
            SessionEvent::ServerError { message, .. } => {
                write!(f, "SERVER_ERROR ({message})")
            }
            SessionEvent::ConnectionLost => write!(f, "CONNECTION_LOST"),
        }
    }
}
