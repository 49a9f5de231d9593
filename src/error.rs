//! Error types for the voicelink client

use thiserror::Error;

use crate::state::DeviceState;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while running a client session
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport connect or hello handshake failed. State reverts to
    /// Unknown; retrying is the caller's job.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A transition was requested from a state that does not allow it.
    /// The device state is left unchanged.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: DeviceState, to: DeviceState },

    /// An inbound control message failed to parse or is missing a
    /// required field. The message is skipped, the session continues.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A half-duplex violation was attempted: starting one audio
    /// direction while the opposite one is active.
    #[error("stream conflict: {0}")]
    StreamConflict(&'static str),

    /// The encoded-audio send queue stayed full past the enqueue timeout.
    #[error("audio send buffer full")]
    SendBufferFull,

    /// The playback queue rejected a decoded frame.
    #[error("playback buffer full")]
    PlaybackBufferFull,

    /// The server reported an error for this session. Surfaced upward;
    /// does not terminate the session by itself.
    #[error("session {session_id} error: {message}")]
    SessionError { session_id: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("audio error: {0}")]
    Audio(String),
}
