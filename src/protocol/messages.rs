//! Protocol message schema
//!
//! Outbound messages are built by the session (hello handshake, listen
//! start/stop); inbound frames are the per-type payloads the dispatcher
//! decodes after reading the `type` discriminator.

use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;
use crate::state::ListenMode;

/// Messages sent from the device to the server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// First message after connect: protocol version and audio geometry
    Hello {
        version: u32,
        transport: String,
        audio_params: AudioParams,
    },

    /// Start or stop the listening session
    Listen {
        session_id: String,
        state: ListenRequestState,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<ListenMode>,
    },
}

impl Outbound {
    pub fn hello(transport: &str, audio: &AudioConfig) -> Self {
        Outbound::Hello {
            version: 1,
            transport: transport.to_string(),
            audio_params: AudioParams::opus(audio),
        }
    }

    pub fn listen_start(session_id: String, mode: ListenMode) -> Self {
        Outbound::Listen {
            session_id,
            state: ListenRequestState::Start,
            mode: Some(mode),
        }
    }

    pub fn listen_stop(session_id: String) -> Self {
        Outbound::Listen {
            session_id,
            state: ListenRequestState::Stop,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenRequestState {
    Start,
    Stop,
}

/// Audio geometry advertised in the hello handshake
#[derive(Debug, Clone, Serialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration: u32,
}

impl AudioParams {
    pub fn opus(audio: &AudioConfig) -> Self {
        Self {
            format: "opus".to_string(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            frame_duration: audio.frame_duration,
        }
    }
}

/// Server's answer to the hello handshake
#[derive(Debug, Clone, Deserialize)]
pub struct HelloFrame {
    pub session_id: String,
}

/// Listening-session notifications, including wake-word detection
#[derive(Debug, Clone, Deserialize)]
pub struct ListenFrame {
    pub state: ListenState,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
    #[serde(other)]
    Other,
}

/// Speech-synthesis lifecycle notifications; start/stop drive the
/// Speaking state
#[derive(Debug, Clone, Deserialize)]
pub struct TtsFrame {
    pub state: TtsState,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    SentenceStart,
    SentenceEnd,
    Stop,
    #[serde(other)]
    Other,
}

/// Transcription of the captured utterance
#[derive(Debug, Clone, Deserialize)]
pub struct SttFrame {
    pub session_id: String,
    pub text: String,
}

/// Assistant reply text
#[derive(Debug, Clone, Deserialize)]
pub struct LlmFrame {
    pub session_id: String,
    pub text: String,
    #[serde(default)]
    pub emotion: Option<String>,
}

/// Server-initiated return to idle
#[derive(Debug, Clone, Deserialize)]
pub struct AbortFrame {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Server-reported session error
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    pub message: String,
    pub session_id: String,
}
