//! Session orchestrator
//!
//! Owns the device state under one exclusive lock, the server-assigned
//! session identity, and the three tasks of a connected session: the
//! inbound message pump, the audio-send pump and the capture task. State
//! entry side effects run while the lock is held so no other transition
//! can interleave mid-effect; that ordering is what keeps the device
//! half-duplex at the protocol level.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::audio::{Decoder, Encoder, PcmFrame, Player, Recorder, StreamController};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::events::SessionEvent;
use crate::protocol::{
    self, AbortFrame, ErrorFrame, HelloFrame, ListenFrame, ListenState, LlmFrame, Outbound,
    ServerMessage, SttFrame, TtsFrame, TtsState,
};
use crate::state::{DeviceState, ListenMode};
use crate::transport::{Message, MessageKind, Transport};

/// Depth of the encoded-frame send queue
const SEND_QUEUE_DEPTH: usize = 100;
/// How long an enqueue may wait before the frame is dropped
const SEND_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(50);
/// Pause before the single playback retry when its buffer is full
const PLAYBACK_RETRY_PAUSE: Duration = Duration::from_millis(20);
/// Bounded wait for each task to exit during close
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Read-only snapshot for external observers
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: DeviceState,
    pub session_id: String,
    pub connection_status: String,
}

/// The capability backends a client session runs on
pub struct Capabilities {
    pub transport: Arc<dyn Transport>,
    pub recorder: Box<dyn Recorder>,
    pub encoder: Box<dyn Encoder>,
    pub decoder: Box<dyn Decoder>,
    pub player: Box<dyn Player>,
}

/// A client session with the voice server
pub struct Client {
    inner: Arc<ClientInner>,
    decoder: Option<Box<dyn Decoder>>,
    player: Option<Box<dyn Player>>,
    audio_rx: Option<mpsc::Receiver<Vec<u8>>>,
}

struct ClientInner {
    config: Config,
    state: RwLock<DeviceState>,
    session_id: RwLock<String>,
    streams: StreamController,
    transport: Arc<dyn Transport>,
    connected: AtomicBool,
    recorder: Mutex<Option<Box<dyn Recorder>>>,
    encoder: Mutex<Option<Box<dyn Encoder>>>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    shutdown: broadcast::Sender<()>,
    capture_stop: broadcast::Sender<()>,
    events: broadcast::Sender<SessionEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    pub fn new(config: Config, capabilities: Capabilities) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let (shutdown, _) = broadcast::channel(1);
        let (capture_stop, _) = broadcast::channel(1);
        let (events, _) = broadcast::channel(64);

        let inner = Arc::new(ClientInner {
            config,
            state: RwLock::new(DeviceState::Unknown),
            session_id: RwLock::new(String::new()),
            streams: StreamController::new(),
            transport: capabilities.transport,
            connected: AtomicBool::new(false),
            recorder: Mutex::new(Some(capabilities.recorder)),
            encoder: Mutex::new(Some(capabilities.encoder)),
            audio_tx,
            shutdown,
            capture_stop,
            events,
            tasks: Mutex::new(Vec::new()),
        });

        Self {
            inner,
            decoder: Some(capabilities.decoder),
            player: Some(capabilities.player),
            audio_rx: Some(audio_rx),
        }
    }

    /// Subscribe to session events
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Connect the transport, perform the hello handshake and start the
    /// session pumps. On failure the state reverts to Unknown and the
    /// error is returned; retrying is the caller's decision.
    pub async fn connect(&mut self) -> ClientResult<()> {
        self.inner.set_state(DeviceState::Connecting)?;
        info!(
            transport = self.inner.transport.protocol_name(),
            "connecting to server"
        );

        if let Err(e) = self.inner.transport.connect().await {
            let _ = self.inner.set_state(DeviceState::Unknown);
            error!(error = %e, "failed to connect to server");
            return Err(e);
        }

        let hello = Outbound::hello(
            self.inner.transport.protocol_name(),
            &self.inner.config.audio,
        );
        if let Err(e) = self.inner.send_json(&hello).await {
            let _ = self.inner.transport.close().await;
            let _ = self.inner.set_state(DeviceState::Unknown);
            error!(error = %e, "failed to send hello message");
            return Err(ClientError::ConnectionFailed(format!(
                "hello handshake failed: {e}"
            )));
        }

        let inbound = self.inner.transport.take_inbound().ok_or_else(|| {
            ClientError::Transport("transport produced no inbound queue".to_string())
        })?;
        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| ClientError::Audio("decoder already consumed".to_string()))?;
        let player = self
            .player
            .take()
            .ok_or_else(|| ClientError::Audio("player already consumed".to_string()))?;
        let audio_rx = self
            .audio_rx
            .take()
            .ok_or_else(|| ClientError::Audio("send queue already consumed".to_string()))?;

        self.inner.connected.store(true, Ordering::SeqCst);
        info!("connected to server");
        self.inner.set_state(DeviceState::Idle)?;

        let inbound_task = tokio::spawn(Arc::clone(&self.inner).inbound_pump(
            inbound,
            decoder,
            player,
        ));
        let send_task = tokio::spawn(Arc::clone(&self.inner).send_pump(audio_rx));
        self.inner.tasks.lock().extend([inbound_task, send_task]);

        Ok(())
    }

    /// Start a listening session. Legal only while Idle.
    pub async fn start_listening(&self, mode: ListenMode) -> ClientResult<()> {
        self.inner.start_listening(mode).await
    }

    /// Stop the listening session. Legal only while Listening.
    pub async fn stop_listening(&self) -> ClientResult<()> {
        self.inner.stop_listening().await
    }

    /// Read-only status snapshot
    pub fn status(&self) -> Status {
        let connection_status = if self.inner.connected.load(Ordering::SeqCst) {
            "connected"
        } else {
            "disconnected"
        };
        Status {
            state: self.inner.state(),
            session_id: self.inner.session_id.read().clone(),
            connection_status: connection_status.to_string(),
        }
    }

    /// Resolves once the server connection is gone
    pub async fn connection_lost(&self) {
        let mut events = self.inner.events.subscribe();
        loop {
            match events.recv().await {
                Ok(SessionEvent::ConnectionLost) => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if !self.inner.connected.load(Ordering::SeqCst) {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Close the session: broadcast shutdown, wait boundedly for the
    /// pumps, close the transport and enter the terminal Disconnected
    /// state. Idempotent.
    pub async fn close(&self) -> ClientResult<()> {
        info!("closing client session");
        let _ = self.inner.shutdown.send(());
        let _ = self.inner.capture_stop.send(());

        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if timeout(TASK_SHUTDOWN_TIMEOUT, task).await.is_err() {
                warn!("session task did not stop in time");
            }
        }

        if let Err(e) = self.inner.transport.close().await {
            error!(error = %e, "failed to close transport");
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.set_state(DeviceState::Disconnected)?;
        info!("client session closed");
        Ok(())
    }
}

impl ClientInner {
    fn state(&self) -> DeviceState {
        *self.state.read()
    }

    fn session_id(&self) -> String {
        self.session_id.read().clone()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// The only mutation point for the device state. Validates the
    /// transition against the legality table and runs entry side effects
    /// while the lock is held; an effect refusal leaves the state
    /// untouched.
    fn set_state(&self, next: DeviceState) -> ClientResult<()> {
        let mut state = self.state.write();
        let previous = *state;
        if previous == next {
            return Ok(());
        }
        if !previous.can_transition_to(next) {
            return Err(ClientError::InvalidStateTransition {
                from: previous,
                to: next,
            });
        }

        match next {
            DeviceState::Speaking => {
                // Send must be off before playback may begin.
                self.streams.stop_sending();
                if !self.streams.try_start_receiving() {
                    return Err(ClientError::StreamConflict("cannot receive while sending"));
                }
            }
            DeviceState::Listening => {
                if !self.streams.try_start_sending() {
                    return Err(ClientError::StreamConflict("cannot send while receiving"));
                }
            }
            DeviceState::Disconnected => {
                self.streams.stop_sending();
                self.streams.stop_receiving();
                self.session_id.write().clear();
            }
            _ => {}
        }

        *state = next;
        drop(state);

        info!(from = %previous, to = %next, "state transition");
        self.emit(SessionEvent::StateChanged {
            from: previous,
            to: next,
        });
        Ok(())
    }

    async fn send_json<T: Serialize>(&self, message: &T) -> ClientResult<()> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| ClientError::MalformedMessage(format!("failed to encode: {e}")))?;
        debug!(json = %String::from_utf8_lossy(&payload), "sending control message");
        self.transport.send(payload, MessageKind::Text).await
    }

    async fn start_listening(&self, mode: ListenMode) -> ClientResult<()> {
        let current = self.state();
        if current != DeviceState::Idle {
            warn!(state = %current, "cannot start listening from current state");
            return Err(ClientError::InvalidStateTransition {
                from: current,
                to: DeviceState::Listening,
            });
        }

        info!(mode = %mode, "starting listening");
        self.send_json(&Outbound::listen_start(self.session_id(), mode))
            .await?;
        self.set_state(DeviceState::Listening)
    }

    async fn stop_listening(&self) -> ClientResult<()> {
        let current = self.state();
        if current != DeviceState::Listening {
            warn!(state = %current, "cannot stop listening from current state");
            return Err(ClientError::InvalidStateTransition {
                from: current,
                to: DeviceState::Idle,
            });
        }

        info!("stopping listening");
        self.send_json(&Outbound::listen_stop(self.session_id()))
            .await?;
        self.set_state(DeviceState::Idle)
    }

    /// Inbound pump: decode and route everything the transport delivers
    /// until the queue closes or shutdown is broadcast.
    async fn inbound_pump(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<Message>,
        mut decoder: Box<dyn Decoder>,
        player: Box<dyn Player>,
    ) {
        debug!("inbound message pump started");
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = inbound.recv() => {
                    let Some(message) = received else {
                        warn!("transport receive queue closed");
                        self.connected.store(false, Ordering::SeqCst);
                        self.emit(SessionEvent::ConnectionLost);
                        break;
                    };
                    match message.kind {
                        MessageKind::Text => {
                            if let Err(e) = self.handle_text(&message.payload).await {
                                error!(error = %e, "failed to handle text message");
                            }
                        }
                        MessageKind::Binary => {
                            if let Err(e) = self
                                .handle_binary(&message.payload, decoder.as_mut(), player.as_ref())
                                .await
                            {
                                error!(error = %e, "failed to handle binary message");
                            }
                        }
                        MessageKind::Control => {
                            debug!(size = message.payload.len(), "ignoring control message");
                        }
                    }
                }
            }
        }
        debug!("inbound message pump stopped");
    }

    /// Audio-send pump: forward queued encoded frames while the send
    /// stream is active.
    async fn send_pump(self: Arc<Self>, mut frames: mpsc::Receiver<Vec<u8>>) {
        debug!("audio sender started");
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    if !self.streams.is_sending() {
                        continue;
                    }
                    if let Err(e) = self.transport.send(frame, MessageKind::Binary).await {
                        error!(error = %e, "failed to send audio frame");
                        break;
                    }
                }
            }
        }
        debug!("audio sender stopped");
    }

    /// Capture task: encode raw frames and enqueue them for sending, but
    /// only while the device is Listening with the send stream active.
    /// Runs from the hello response until the session closes.
    async fn capture_task(
        self: Arc<Self>,
        mut recorder: Box<dyn Recorder>,
        mut encoder: Box<dyn Encoder>,
    ) {
        info!("starting audio capture");
        let (raw_tx, mut raw_rx) = mpsc::channel::<PcmFrame>(SEND_QUEUE_DEPTH);
        let record_stop = self.capture_stop.subscribe();
        let recorder_task = tokio::spawn(async move {
            if let Err(e) = recorder.record(record_stop, raw_tx).await {
                error!(error = %e, "audio recording failed");
            }
        });

        let mut shutdown = self.shutdown.subscribe();
        let mut capture_stop = self.capture_stop.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("stopping audio capture for shutdown");
                    break;
                }
                _ = capture_stop.recv() => {
                    info!("stopping audio capture");
                    break;
                }
                chunk = raw_rx.recv() => {
                    let Some(chunk) = chunk else {
                        info!("capture source closed");
                        break;
                    };
                    if self.state() != DeviceState::Listening || !self.streams.is_sending() {
                        debug!(
                            state = %self.state(),
                            sending = self.streams.is_sending(),
                            "skipping audio send"
                        );
                        continue;
                    }
                    let frame = match encoder.encode(&chunk) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(error = %e, "audio encode failed");
                            continue;
                        }
                    };
                    match self.audio_tx.send_timeout(frame, SEND_ENQUEUE_TIMEOUT).await {
                        Ok(()) => {}
                        Err(SendTimeoutError::Timeout(_)) => {
                            // Freshness over completeness: the pipeline
                            // must not stall behind a full queue.
                            warn!("audio send queue full, dropping frame");
                        }
                        Err(SendTimeoutError::Closed(_)) => break,
                    }
                }
            }
        }

        let _ = self.capture_stop.send(());
        if timeout(TASK_SHUTDOWN_TIMEOUT, recorder_task).await.is_err() {
            warn!("recorder did not stop in time");
        }
    }

    /// Launch the capture task once per session, handing it the recorder
    /// and encoder.
    fn spawn_capture_task(self: &Arc<Self>) {
        let Some(recorder) = self.recorder.lock().take() else {
            debug!("capture task already launched");
            return;
        };
        let Some(encoder) = self.encoder.lock().take() else {
            debug!("capture task already launched");
            return;
        };
        let task = tokio::spawn(Arc::clone(self).capture_task(recorder, encoder));
        self.tasks.lock().push(task);
    }

    async fn handle_text(self: &Arc<Self>, payload: &[u8]) -> ClientResult<()> {
        let Some(message) = protocol::parse(payload)? else {
            return Ok(());
        };
        match message {
            ServerMessage::Hello(frame) => self.handle_hello(frame).await,
            ServerMessage::Listen(frame) => self.handle_listen(frame),
            ServerMessage::Tts(frame) => self.handle_tts(frame).await,
            ServerMessage::Stt(frame) => self.handle_stt(frame),
            ServerMessage::Llm(frame) => self.handle_llm(frame),
            ServerMessage::Abort(frame) => self.handle_abort(frame),
            ServerMessage::Error(frame) => self.handle_error(frame),
        }
    }

    /// Encoded server speech: decode and enqueue for playback, dropping
    /// the frame if the playback buffer stays full past one retry.
    async fn handle_binary(
        &self,
        payload: &[u8],
        decoder: &mut dyn Decoder,
        player: &dyn Player,
    ) -> ClientResult<()> {
        if !self.streams.is_receiving() {
            debug!(size = payload.len(), "received unexpected binary message");
            return Ok(());
        }

        let pcm = decoder.decode(payload)?;
        let mut result = player.play(&pcm);
        if matches!(result, Err(ClientError::PlaybackBufferFull)) {
            tokio::time::sleep(PLAYBACK_RETRY_PAUSE).await;
            result = player.play(&pcm);
        }
        match result {
            Ok(()) => {
                debug!(samples = pcm.len(), "played audio frame");
                Ok(())
            }
            Err(ClientError::PlaybackBufferFull) => {
                warn!("playback buffer full, dropping frame");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Hello response: record the session identity, start listening and
    /// launch the capture task.
    async fn handle_hello(self: &Arc<Self>, frame: HelloFrame) -> ClientResult<()> {
        info!(session_id = %frame.session_id, "hello acknowledged by server");
        *self.session_id.write() = frame.session_id.clone();
        self.emit(SessionEvent::SessionEstablished {
            session_id: frame.session_id,
        });

        if let Err(e) = self.start_listening(ListenMode::Auto).await {
            error!(error = %e, "failed to start listening after hello");
        }
        self.spawn_capture_task();
        Ok(())
    }

    fn handle_listen(&self, frame: ListenFrame) -> ClientResult<()> {
        match frame.state {
            ListenState::Detect => {
                if let Some(text) = frame.text {
                    info!(text = %text, "wake word detected");
                    self.emit(SessionEvent::WakeWordDetected { text });
                }
                Ok(())
            }
            _ => {
                debug!(state = ?frame.state, "received listen message");
                Ok(())
            }
        }
    }

    /// Server speech lifecycle. Start forces capture off and flips to
    /// Speaking; stop releases the receive stream and, when auto-listen
    /// is on, immediately re-requests listening.
    async fn handle_tts(&self, frame: TtsFrame) -> ClientResult<()> {
        match frame.state {
            TtsState::Start => self.set_state(DeviceState::Speaking),
            TtsState::Stop => {
                self.streams.stop_receiving();
                info!("stopped audio receiving");
                self.set_state(DeviceState::Idle)?;
                if self.config.system.auto_listen {
                    if let Err(e) = self.start_listening(ListenMode::Auto).await {
                        error!(error = %e, "failed to resume listening");
                    }
                }
                Ok(())
            }
            TtsState::SentenceStart => {
                match frame.text {
                    Some(text) => info!(
                        text = %text,
                        session_id = frame.session_id.as_deref().unwrap_or(""),
                        "tts sentence started"
                    ),
                    None => warn!("tts sentence_start missing text"),
                }
                Ok(())
            }
            TtsState::SentenceEnd => {
                match frame.text {
                    Some(text) => info!(
                        text = %text,
                        session_id = frame.session_id.as_deref().unwrap_or(""),
                        "tts sentence ended"
                    ),
                    None => warn!("tts sentence_end missing text"),
                }
                Ok(())
            }
            TtsState::Other => {
                debug!("ignoring unrecognized tts state");
                Ok(())
            }
        }
    }

    fn handle_stt(&self, frame: SttFrame) -> ClientResult<()> {
        info!(text = %frame.text, session_id = %frame.session_id, "transcription received");
        self.emit(SessionEvent::TranscriptReceived {
            session_id: frame.session_id,
            text: frame.text,
        });
        Ok(())
    }

    fn handle_llm(&self, frame: LlmFrame) -> ClientResult<()> {
        let emotion = frame.emotion.unwrap_or_else(|| "neutral".to_string());
        info!(
            text = %frame.text,
            emotion = %emotion,
            session_id = %frame.session_id,
            "assistant reply received"
        );
        self.emit(SessionEvent::AssistantReply {
            session_id: frame.session_id,
            text: frame.text,
            emotion,
        });
        Ok(())
    }

    fn handle_abort(&self, frame: AbortFrame) -> ClientResult<()> {
        info!(
            reason = frame.reason.as_deref().unwrap_or(""),
            "session aborted by server"
        );
        self.set_state(DeviceState::Idle)
    }

    fn handle_error(&self, frame: ErrorFrame) -> ClientResult<()> {
        error!(
            session_id = %frame.session_id,
            message = %frame.message,
            "server reported an error"
        );
        self.emit(SessionEvent::ServerError {
            session_id: frame.session_id.clone(),
            message: frame.message.clone(),
        });
        Err(ClientError::SessionError {
            session_id: frame.session_id,
            message: frame.message,
        })
    }
}
