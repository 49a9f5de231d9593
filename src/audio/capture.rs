//! Microphone capture backend
//!
//! cpal streams are not `Send`, so the input stream lives on a dedicated
//! thread; the device callback slices the incoming samples into exact
//! frame-duration frames and hands them to the session over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, ClientResult};

use super::{FrameSpec, PcmFrame, Recorder};

/// How often the capture thread checks whether it should exit
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct CpalRecorder {
    spec: FrameSpec,
    running: Arc<AtomicBool>,
}

impl CpalRecorder {
    pub fn new(spec: FrameSpec) -> Self {
        Self {
            spec,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Recorder for CpalRecorder {
    async fn record(
        &mut self,
        mut stop: broadcast::Receiver<()>,
        frames: mpsc::Sender<PcmFrame>,
    ) -> ClientResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Audio("recorder already running".to_string()));
        }

        let spec = self.spec;
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<ClientResult<()>>();

        let worker = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture_thread(spec, frames, running, ready_tx))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                ClientError::Audio(format!("failed to spawn capture thread: {e}"))
            })?;

        // Stream construction happens on the capture thread; wait for its
        // verdict before reporting the recorder as started.
        let startup = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| ClientError::Audio(format!("capture startup interrupted: {e}")))?;
        match startup {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(ClientError::Audio(
                    "capture thread exited before startup".to_string(),
                ));
            }
        }

        info!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            frame_duration_ms = spec.frame_duration_ms,
            "audio recording started"
        );

        let _ = stop.recv().await;

        self.running.store(false, Ordering::SeqCst);
        let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        info!("audio recording stopped");
        Ok(())
    }
}

fn capture_thread(
    spec: FrameSpec,
    frames: mpsc::Sender<PcmFrame>,
    running: Arc<AtomicBool>,
    ready: std::sync::mpsc::Sender<ClientResult<()>>,
) {
    let stream = match build_input_stream(spec, frames) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(ClientError::Audio(format!(
            "failed to start capture stream: {e}"
        ))));
        return;
    }

    let _ = ready.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::sleep(STOP_POLL_INTERVAL);
    }

    drop(stream);
}

fn build_input_stream(
    spec: FrameSpec,
    frames: mpsc::Sender<PcmFrame>,
) -> ClientResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ClientError::Audio("no input device available".to_string()))?;

    debug!(
        device = %device.name().unwrap_or_default(),
        "using input device"
    );

    let config = StreamConfig {
        channels: spec.channels,
        sample_rate: SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let samples_per_frame = spec.samples_per_frame();
    let mut pending: Vec<i16> = Vec::with_capacity(samples_per_frame * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                pending.extend_from_slice(data);
                while pending.len() >= samples_per_frame {
                    let frame: PcmFrame = pending.drain(..samples_per_frame).collect();
                    // The device callback must never block; a full queue
                    // costs us the frame.
                    match frames.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("capture queue full, dropping frame");
                        }
                        Err(TrySendError::Closed(_)) => return,
                    }
                }
            },
            move |err| {
                error!(%err, "audio input error");
            },
            None,
        )
        .map_err(|e| ClientError::Audio(format!("failed to build input stream: {e}")))?;

    Ok(stream)
}
