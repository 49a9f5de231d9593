//! Device state module
//!
//! Provides the device-side view of a voice session: the six device
//! states, the set of legal transitions between them, and the listening
//! modes carried in listen-start requests.

mod machine;

pub use machine::{DeviceState, ListenMode};
