//! Wire protocol
//!
//! JSON control messages ride on text-kind transport messages, each with
//! a mandatory `type` discriminator. `messages` defines both directions
//! of the schema; `dispatcher` turns inbound payloads into routed,
//! field-checked values for the session's handlers.

mod dispatcher;
mod messages;

pub use dispatcher::{parse, ServerMessage};
pub use messages::{
    AbortFrame, AudioParams, ErrorFrame, HelloFrame, ListenFrame, ListenState, LlmFrame, Outbound,
    SttFrame, TtsFrame, TtsState,
};
