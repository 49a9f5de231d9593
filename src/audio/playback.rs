//! Speaker playback backend
//!
//! A bounded queue of PCM chunks feeds a cpal output stream living on its
//! own thread. The device callback drains one chunk completely before
//! pulling the next and zero-fills whatever output space remains, so
//! chunk boundaries are never interleaved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tracing::{debug, error};

use crate::error::{ClientError, ClientResult};

use super::{FrameSpec, PcmFrame, Player};

/// Chunks buffered ahead of the output stream
const PLAYBACK_QUEUE_DEPTH: usize = 100;
/// How often the playback thread checks whether it should exit
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct CpalPlayer {
    chunks: SyncSender<PcmFrame>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CpalPlayer {
    pub fn new(spec: FrameSpec) -> ClientResult<Self> {
        let (chunks, queue) = sync_channel(PLAYBACK_QUEUE_DEPTH);
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<ClientResult<()>>();

        let thread_running = Arc::clone(&running);
        let worker = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || playback_thread(spec, queue, thread_running, ready_tx))
            .map_err(|e| ClientError::Audio(format!("failed to spawn playback thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(ClientError::Audio(
                    "playback thread exited before startup".to_string(),
                ));
            }
        }

        debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "audio playback started"
        );

        Ok(Self {
            chunks,
            running,
            worker: Some(worker),
        })
    }
}

impl Player for CpalPlayer {
    fn play(&self, frame: &[i16]) -> ClientResult<()> {
        match self.chunks.try_send(frame.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ClientError::PlaybackBufferFull),
            Err(TrySendError::Disconnected(_)) => {
                Err(ClientError::Audio("audio player closed".to_string()))
            }
        }
    }
}

impl Drop for CpalPlayer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn playback_thread(
    spec: FrameSpec,
    queue: Receiver<PcmFrame>,
    running: Arc<AtomicBool>,
    ready: std::sync::mpsc::Sender<ClientResult<()>>,
) {
    let stream = match build_output_stream(spec, queue) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(ClientError::Audio(format!(
            "failed to start playback stream: {e}"
        ))));
        return;
    }

    let _ = ready.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::sleep(STOP_POLL_INTERVAL);
    }

    drop(stream);
}

fn build_output_stream(spec: FrameSpec, queue: Receiver<PcmFrame>) -> ClientResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ClientError::Audio("no output device available".to_string()))?;

    debug!(
        device = %device.name().unwrap_or_default(),
        "using output device"
    );

    let config = StreamConfig {
        channels: spec.channels,
        sample_rate: SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut current: PcmFrame = Vec::new();
    let mut position: usize = 0;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill_output(data, &mut current, &mut position, &queue);
            },
            move |err| {
                error!(%err, "audio output error");
            },
            None,
        )
        .map_err(|e| ClientError::Audio(format!("failed to build output stream: {e}")))?;

    Ok(stream)
}

/// Fill the output buffer chunk-sequentially: the current chunk is drained
/// to its end before the next is pulled, and any space that cannot be
/// filled becomes silence.
fn fill_output(
    data: &mut [i16],
    current: &mut PcmFrame,
    position: &mut usize,
    queue: &Receiver<PcmFrame>,
) {
    let mut filled = 0;
    while filled < data.len() {
        if *position >= current.len() {
            match queue.try_recv() {
                Ok(next) => {
                    *current = next;
                    *position = 0;
                }
                Err(_) => break,
            }
            continue;
        }
        let take = (current.len() - *position).min(data.len() - filled);
        data[filled..filled + take].copy_from_slice(&current[*position..*position + take]);
        *position += take;
        filled += take;
    }
    data[filled..].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_drains_chunk_before_pulling_next() {
        let (tx, rx) = sync_channel::<PcmFrame>(4);
        tx.send(vec![1, 2, 3, 4]).unwrap();
        tx.send(vec![5, 6]).unwrap();

        let mut current = PcmFrame::new();
        let mut position = 0;

        let mut out = [0i16; 3];
        fill_output(&mut out, &mut current, &mut position, &rx);
        assert_eq!(out, [1, 2, 3]);

        fill_output(&mut out, &mut current, &mut position, &rx);
        assert_eq!(out, [4, 5, 6]);
    }

    #[test]
    fn test_fill_zero_fills_when_queue_is_dry() {
        let (tx, rx) = sync_channel::<PcmFrame>(4);
        tx.send(vec![7, 8]).unwrap();

        let mut current = PcmFrame::new();
        let mut position = 0;

        let mut out = [9i16; 5];
        fill_output(&mut out, &mut current, &mut position, &rx);
        assert_eq!(out, [7, 8, 0, 0, 0]);
    }

    #[test]
    fn test_fill_spans_multiple_chunks() {
        let (tx, rx) = sync_channel::<PcmFrame>(4);
        tx.send(vec![1]).unwrap();
        tx.send(vec![2]).unwrap();
        tx.send(vec![3]).unwrap();

        let mut current = PcmFrame::new();
        let mut position = 0;

        let mut out = [0i16; 4];
        fill_output(&mut out, &mut current, &mut position, &rx);
        assert_eq!(out, [1, 2, 3, 0]);
    }

    #[test]
    fn test_fill_skips_empty_chunks() {
        let (tx, rx) = sync_channel::<PcmFrame>(4);
        tx.send(vec![]).unwrap();
        tx.send(vec![4, 5]).unwrap();

        let mut current = PcmFrame::new();
        let mut position = 0;

        let mut out = [0i16; 2];
        fill_output(&mut out, &mut current, &mut position, &rx);
        assert_eq!(out, [4, 5]);
    }
}
