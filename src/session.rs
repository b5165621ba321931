//! Live audio session controller
//!
//! Owns the microphone, the playback context and the live transport for the duration
//! of one session and moves through `Idle -> Opening -> Live -> Closing -> Idle`.
//! Capture blocks go out as 16 kHz PCM once the session is open; inline audio from the
//! model is decoded at 24 kHz and scheduled back to back. All state is touched from one
//! task: [`SessionController::run`] selects over commands, capture blocks and session
//! events, so nothing here needs a lock.

use crate::codec;
use crate::devices::{
    AudioDevices, CaptureDevice, PlaybackDevice, CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE,
    PLAYBACK_SAMPLE_RATE,
};
use crate::error::{Error, Result};
use crate::gemini::LiveServerMessage;
use crate::live::{EncodedChunk, LiveConnector, LiveEvent, LiveTransport};
use crate::playback::PlaybackScheduler;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Live,
    Closing,
}

/// Requests accepted by [`SessionController::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    /// Stop any session and leave the run loop.
    Shutdown,
}

/// Resources held while a session is not Idle.
struct ActiveSession<I, O, T> {
    capture: I,
    capture_rx: Option<mpsc::Receiver<Vec<f32>>>,
    scheduler: PlaybackScheduler<O>,
    transport: T,
    events: Option<UnboundedReceiver<LiveEvent>>,
    chunks_sent: u64,
}

enum Step {
    Command(Option<SessionCommand>),
    Capture(Option<Vec<f32>>),
    Event(Option<LiveEvent>),
}

async fn next_block(rx: Option<&mut mpsc::Receiver<Vec<f32>>>) -> Option<Vec<f32>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_event(rx: Option<&mut UnboundedReceiver<LiveEvent>>) -> Option<LiveEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct SessionController<C: LiveConnector, D: AudioDevices> {
    connector: C,
    devices: D,
    state: watch::Sender<SessionState>,
    active: Option<ActiveSession<D::Input, D::Output, C::Transport>>,
}

impl<C: LiveConnector, D: AudioDevices> SessionController<C, D> {
    pub fn new(connector: C, devices: D) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            connector,
            devices,
            state,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        debug!("Session state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Acquire both audio devices and request a live session.
    ///
    /// On any failure everything acquired so far is released and the controller is
    /// back in Idle before the error is returned. Nothing is transmitted until the
    /// session reports `Open`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(Error::InvalidState("session already started"));
        }
        self.set_state(SessionState::Opening);

        let (mut capture, capture_rx) =
            match self.devices.open_input(CAPTURE_SAMPLE_RATE, CAPTURE_BLOCK_SIZE).await {
                Ok(input) => input,
                Err(e) => {
                    error!("Microphone acquisition failed: {}", e);
                    self.set_state(SessionState::Idle);
                    return Err(e);
                }
            };

        let mut output = match self.devices.open_output(PLAYBACK_SAMPLE_RATE).await {
            Ok(output) => output,
            Err(e) => {
                error!("Playback context acquisition failed: {}", e);
                capture.release();
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        let link = match self.connector.connect_live() {
            Ok(link) => link,
            Err(e) => {
                error!("Live session request failed: {}", e);
                capture.release();
                output.release();
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        info!("Live session opening");
        self.active = Some(ActiveSession {
            capture,
            capture_rx: Some(capture_rx),
            scheduler: PlaybackScheduler::new(output),
            transport: link.transport,
            events: Some(link.events),
            chunks_sent: 0,
        });
        Ok(())
    }

    /// Close the session and release the devices. Scheduled audio plays out.
    ///
    /// No-op when Idle.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        self.set_state(SessionState::Closing);

        active.transport.close();
        active.capture.release();
        let pending = active.scheduler.pending();
        active.scheduler.into_device().release();

        info!(
            "Live session closed ({} chunks sent, {} buffers left to play)",
            active.chunks_sent, pending
        );
        self.set_state(SessionState::Idle);
    }

    pub fn handle_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Open => {
                if self.state() == SessionState::Opening {
                    info!("Live session open, streaming microphone");
                    self.set_state(SessionState::Live);
                } else {
                    debug!("Ignoring Open in state {:?}", self.state());
                }
            }
            LiveEvent::Message(message) => self.on_message(&message),
            LiveEvent::Error(e) => {
                error!("Live session error: {}", e);
                self.stop();
            }
            LiveEvent::Close(reason) => {
                info!("Live session closed by remote: {:?}", reason);
                self.stop();
            }
        }
    }

    fn on_message(&mut self, message: &LiveServerMessage) {
        if self.state() != SessionState::Live {
            debug!("Ignoring server message in state {:?}", self.state());
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        if message.is_interrupted() {
            info!("Model interrupted, cancelling queued playback");
            active.scheduler.interrupt();
        }

        if let Some(data) = message.inline_audio() {
            let bytes = match codec::decode_text(data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Dropping undecodable audio chunk: {}", e);
                    return;
                }
            };
            let buffer = codec::pcm_bytes_to_audio_buffer(&bytes, PLAYBACK_SAMPLE_RATE, 1);
            if let Err(e) = active.scheduler.schedule(buffer) {
                warn!("Failed to schedule audio chunk: {}", e);
            }
        }
    }

    /// Send one capture block. Blocks captured before the session is Live are dropped.
    pub fn on_capture_block(&mut self, block: &[f32]) {
        if self.state() != SessionState::Live {
            debug!("Dropping capture block in state {:?}", self.state());
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let chunk = EncodedChunk::pcm16k(&codec::float_samples_to_pcm_bytes(block));
        match active.transport.send_realtime_input(chunk) {
            Ok(()) => active.chunks_sent += 1,
            Err(e) => warn!("Failed to queue audio chunk: {}", e),
        }
    }

    /// Drive the controller until `Shutdown` or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("Session controller running");
        loop {
            let step = {
                let (capture_rx, events) = match self.active.as_mut() {
                    Some(active) => (active.capture_rx.as_mut(), active.events.as_mut()),
                    None => (None, None),
                };
                tokio::select! {
                    cmd = commands.recv() => Step::Command(cmd),
                    block = next_block(capture_rx) => Step::Capture(block),
                    event = next_event(events) => Step::Event(event),
                }
            };

            match step {
                Step::Command(Some(SessionCommand::Start)) => {
                    if let Err(e) = self.start().await {
                        error!("Failed to start live session: {}", e);
                    }
                }
                Step::Command(Some(SessionCommand::Stop)) => self.stop(),
                Step::Command(Some(SessionCommand::Shutdown)) | Step::Command(None) => {
                    self.stop();
                    break;
                }
                Step::Capture(Some(block)) => self.on_capture_block(&block),
                Step::Capture(None) => {
                    warn!("Microphone stream ended");
                    self.stop();
                }
                Step::Event(Some(event)) => self.handle_event(event),
                Step::Event(None) => {
                    warn!("Live event channel closed without Close");
                    self.stop();
                }
            }
        }
        info!("Session controller stopped");
    }
}
