//! Opus codec backends
//!
//! One encoded wire frame per PCM frame in each direction; the session
//! core treats the bytes as opaque.

use opus::{Application, Channels};

use crate::error::{ClientError, ClientResult};

use super::{Decoder, Encoder, FrameSpec, PcmFrame};

/// Voice-tuned encoder bitrate
const VOICE_BITRATE: i32 = 32_000;
/// Largest possible opus frame per channel (120 ms at 48 kHz)
const MAX_FRAME_SAMPLES: usize = 5760;
/// Upper bound for one encoded voice frame
const MAX_PACKET_BYTES: usize = 4000;

pub struct OpusEncoder {
    encoder: opus::Encoder,
    spec: FrameSpec,
}

impl OpusEncoder {
    pub fn new(spec: FrameSpec) -> ClientResult<Self> {
        let mut encoder = opus::Encoder::new(spec.sample_rate, channel_layout(spec.channels)?, Application::Voip)
            .map_err(|e| ClientError::Audio(format!("failed to create opus encoder: {e}")))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(VOICE_BITRATE))
            .map_err(|e| ClientError::Audio(format!("failed to set bitrate: {e}")))?;

        Ok(Self { encoder, spec })
    }
}

impl Encoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16]) -> ClientResult<Vec<u8>> {
        let expected = self.spec.samples_per_frame();
        if pcm.len() != expected {
            return Err(ClientError::Audio(format!(
                "expected {expected} samples per frame, got {}",
                pcm.len()
            )));
        }

        let mut output = vec![0u8; MAX_PACKET_BYTES];
        let len = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| ClientError::Audio(format!("opus encode failed: {e}")))?;
        output.truncate(len);
        Ok(output)
    }
}

pub struct OpusDecoder {
    decoder: opus::Decoder,
    channels: usize,
}

impl OpusDecoder {
    pub fn new(spec: FrameSpec) -> ClientResult<Self> {
        let decoder = opus::Decoder::new(spec.sample_rate, channel_layout(spec.channels)?)
            .map_err(|e| ClientError::Audio(format!("failed to create opus decoder: {e}")))?;

        Ok(Self {
            decoder,
            channels: spec.channels as usize,
        })
    }
}

impl Decoder for OpusDecoder {
    fn decode(&mut self, frame: &[u8]) -> ClientResult<PcmFrame> {
        let mut pcm = vec![0i16; MAX_FRAME_SAMPLES * self.channels];
        let samples = self
            .decoder
            .decode(frame, &mut pcm, false)
            .map_err(|e| ClientError::Audio(format!("opus decode failed: {e}")))?;
        pcm.truncate(samples * self.channels);
        Ok(pcm)
    }
}

fn channel_layout(channels: u16) -> ClientResult<Channels> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(ClientError::Audio(format!(
            "unsupported channel count: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_spec() -> FrameSpec {
        FrameSpec {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 60,
        }
    }

    #[test]
    fn test_encode_rejects_short_frame() {
        let mut encoder = OpusEncoder::new(voice_spec()).unwrap();
        let err = encoder.encode(&[0i16; 100]).unwrap_err();
        assert!(matches!(err, ClientError::Audio(_)));
    }

    #[test]
    fn test_encode_decode() {
        let spec = voice_spec();
        let mut encoder = OpusEncoder::new(spec).unwrap();
        let mut decoder = OpusDecoder::new(spec).unwrap();

        let pcm: Vec<i16> = (0..spec.samples_per_frame())
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect();

        let encoded = encoder.encode(&pcm).unwrap();
        assert!(!encoded.is_empty());
        assert!(encoded.len() < pcm.len() * 2);

        let decoded = decoder.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), spec.samples_per_frame());
    }

    #[test]
    fn test_unsupported_channel_count() {
        let spec = FrameSpec {
            sample_rate: 16000,
            channels: 6,
            frame_duration_ms: 60,
        };
        assert!(OpusEncoder::new(spec).is_err());
        assert!(OpusDecoder::new(spec).is_err());
    }
}
