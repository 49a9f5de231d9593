//! Device states and transition legality
//!
//! The orchestrator holds exactly one `DeviceState` at any instant and
//! mutates it only through its `set_state` operation; this module owns
//! the table of which transitions that operation may perform.

use serde::{Deserialize, Serialize};

/// The six possible states of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Not yet connected, or reverted here after a failed connect
    Unknown,
    /// Transport connect and hello handshake in progress
    Connecting,
    /// Connected, no audio moving in either direction
    Idle,
    /// Capturing microphone audio and streaming it to the server
    Listening,
    /// Playing server speech; capture is forced off
    Speaking,
    /// Session closed. Terminal: a new client is needed to reconnect
    Disconnected,
}

impl DeviceState {
    /// Whether the transition table allows moving from `self` to `next`.
    ///
    /// Disconnected has no outgoing edges; Speaking is reachable from any
    /// live state because a tts-start message may arrive at any time.
    pub fn can_transition_to(self, next: DeviceState) -> bool {
        use DeviceState::*;
        match (self, next) {
            (Disconnected, _) => false,
            (_, Disconnected) => true,
            (_, Speaking) => true,
            (Unknown, Connecting) => true,
            (Connecting, Idle) | (Connecting, Unknown) => true,
            (Idle, Listening) => true,
            (Listening, Idle) | (Speaking, Idle) => true,
            _ => false,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Connecting => "connecting",
            DeviceState::Idle => "idle",
            DeviceState::Listening => "listening",
            DeviceState::Speaking => "speaking",
            DeviceState::Disconnected => "disconnected",
        };
        write!(f, "{name}")
    }
}

/// Listening mode carried in listen-start messages; opaque to the client
/// beyond its wire spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    Auto,
    Manual,
    Realtime,
}

impl std::fmt::Display for ListenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ListenMode::Auto => "auto",
            ListenMode::Manual => "manual",
            ListenMode::Realtime => "realtime",
        };
        write!(f, "{name}")
    }
}
