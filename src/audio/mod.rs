//! Audio capabilities
//!
//! The session core never touches audio hardware or codec internals; it
//! talks to the four capability traits below. One backend ships for each:
//! cpal for the microphone and speaker, opus for the codec. The
//! [`StreamController`] is the core-side piece that keeps the device
//! half-duplex regardless of what the hardware allows.

mod capture;
mod codec;
mod playback;
mod stream;

pub use capture::CpalRecorder;
pub use codec::{OpusDecoder, OpusEncoder};
pub use playback::CpalPlayer;
pub use stream::StreamController;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::config::AudioConfig;
use crate::error::ClientResult;

/// One frame of raw signed-16-bit PCM samples, all channels interleaved
pub type PcmFrame = Vec<i16>;

/// Capture source: produces raw PCM frames until the stop signal fires.
///
/// Implementations must never block their device callback; when `frames`
/// is full the frame is dropped and a warning logged.
#[async_trait]
pub trait Recorder: Send {
    async fn record(
        &mut self,
        stop: broadcast::Receiver<()>,
        frames: mpsc::Sender<PcmFrame>,
    ) -> ClientResult<()>;
}

/// Deterministically maps one raw PCM frame to one encoded wire frame
pub trait Encoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> ClientResult<Vec<u8>>;
}

/// Deterministically maps one encoded wire frame back to raw PCM
pub trait Decoder: Send {
    fn decode(&mut self, frame: &[u8]) -> ClientResult<PcmFrame>;
}

/// Playback sink. `play` rejects with `PlaybackBufferFull` when the
/// internal buffer has no room; it never blocks indefinitely.
pub trait Player: Send + Sync {
    fn play(&self, frame: &[i16]) -> ClientResult<()>;
}

/// Frame geometry shared by capture, codec and playback
#[derive(Debug, Clone, Copy)]
pub struct FrameSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u32,
}

impl FrameSpec {
    /// Samples per frame across all channels
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.channels as usize * self.frame_duration_ms as usize)
            / 1000
    }
}

impl From<&AudioConfig> for FrameSpec {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            frame_duration_ms: audio.frame_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_frame() {
        let spec = FrameSpec {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 60,
        };
        assert_eq!(spec.samples_per_frame(), 960);

        let stereo = FrameSpec {
            sample_rate: 48000,
            channels: 2,
            frame_duration_ms: 20,
        };
        assert_eq!(stereo.samples_per_frame(), 1920);
    }
}
