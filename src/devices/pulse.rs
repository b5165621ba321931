//! PulseAudio devices using the Simple API on dedicated OS threads.

use super::{AudioDevices, CaptureDevice, PlaybackDevice, SourceId};
use crate::codec::{self, AudioBuffer};
use crate::error::{Error, Result};

use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Frames mixed and written per playback iteration (20 ms at 24 kHz).
const MIX_BLOCK_FRAMES: usize = 480;
/// Mix blocks the server queues ahead of the speaker (60 ms).
const PLAYBACK_QUEUE_BLOCKS: u32 = 3;

/// Opens PulseAudio capture and playback streams on the default devices.
pub struct PulseDevices {
    app_name: String,
}

impl PulseDevices {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }
}

impl Default for PulseDevices {
    fn default() -> Self {
        Self::new("skycoach")
    }
}

impl AudioDevices for PulseDevices {
    type Input = PulseCapture;
    type Output = PulsePlayback;

    async fn open_input(
        &mut self,
        sample_rate: u32,
        block_size: usize,
    ) -> Result<(PulseCapture, mpsc::Receiver<Vec<f32>>)> {
        let (tx, rx) = mpsc::channel(32);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let app_name = self.app_name.clone();
        let thread_shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("pulse-capture".to_string())
            .spawn(move || {
                capture_loop(app_name, sample_rate, block_size, tx, thread_shutdown, ready_tx)
            })
            .map_err(|e| Error::device(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Microphone capture started at {}Hz, {} samples per block", sample_rate, block_size);
                Ok((PulseCapture { shutdown }, rx))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::device("capture thread exited during startup")),
        }
    }

    async fn open_output(&mut self, sample_rate: u32) -> Result<PulsePlayback> {
        let state = Arc::new(Mutex::new(MixerState::default()));
        let (ready_tx, ready_rx) = oneshot::channel();

        let app_name = self.app_name.clone();
        let thread_state = state.clone();
        std::thread::Builder::new()
            .name("pulse-playback".to_string())
            .spawn(move || playback_loop(app_name, sample_rate, thread_state, ready_tx))
            .map_err(|e| Error::device(format!("failed to spawn playback thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Playback context opened at {}Hz", sample_rate);
                Ok(PulsePlayback {
                    state,
                    sample_rate,
                    next_id: 0,
                    released: false,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::device("playback thread exited during startup")),
        }
    }
}

/// Running microphone capture.
pub struct PulseCapture {
    shutdown: Arc<AtomicBool>,
}

impl CaptureDevice for PulseCapture {
    fn release(&mut self) {
        if !self.shutdown.swap(true, Ordering::Relaxed) {
            info!("Microphone released");
        }
    }
}

impl Drop for PulseCapture {
    fn drop(&mut self) {
        self.release();
    }
}

fn capture_loop(
    app_name: String,
    sample_rate: u32,
    block_size: usize,
    tx: mpsc::Sender<Vec<f32>>,
    shutdown: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<()>>,
) {
    let spec = pulse::sample::Spec {
        format: pulse::sample::Format::F32le,
        channels: 1,
        rate: sample_rate,
    };

    let capture = match psimple::Simple::new(
        None,
        &app_name,
        pulse::stream::Direction::Record,
        None,
        "microphone",
        &spec,
        None,
        None,
    ) {
        Ok(capture) => {
            let _ = ready.send(Ok(()));
            capture
        }
        Err(e) => {
            let _ = ready.send(Err(Error::device(format!("failed to open microphone: {}", e))));
            return;
        }
    };

    let mut bytes = vec![0u8; block_size * 4];
    while !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = capture.read(&mut bytes) {
            error!("Microphone read error: {}", e);
            break;
        }

        let block: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if tx.blocking_send(block).is_err() {
            debug!("Capture receiver dropped");
            break;
        }
    }
    debug!("Capture thread exiting");
}

struct Source {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Source {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Default)]
struct MixerState {
    frames_written: u64,
    sources: Vec<Source>,
    draining: bool,
    /// A source that already reached the server was stopped; its queued frames must go.
    flush_requested: bool,
}

impl MixerState {
    fn add(&mut self, mut source: Source) {
        // the mixer may have moved on since the caller read the clock
        source.start_frame = source.start_frame.max(self.frames_written);
        self.sources.push(source);
    }

    fn stop(&mut self, id: SourceId) {
        let written = self.frames_written;
        let mut reached_server = false;
        self.sources.retain(|s| {
            if s.id == id {
                reached_server |= s.start_frame < written;
                false
            } else {
                true
            }
        });
        self.flush_requested |= reached_server;
    }

    /// Mix the next block into `out` and advance the clock.
    ///
    /// Returns `None` once released with nothing left to play, otherwise whether the
    /// server's queue has to be flushed before `out` is written. A flush drops every
    /// queued frame, including those of sources that keep playing.
    fn next_block(&mut self, out: &mut [f32]) -> Option<bool> {
        if self.draining && self.sources.is_empty() {
            return None;
        }

        out.iter_mut().for_each(|s| *s = 0.0);
        let start = self.frames_written;
        mix_into(&self.sources, start, out);

        let end = start + out.len() as u64;
        self.sources.retain(|s| s.end_frame() > end);
        self.frames_written = end;
        Some(std::mem::take(&mut self.flush_requested))
    }
}

fn lock(state: &Mutex<MixerState>) -> MutexGuard<'_, MixerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Playback context whose clock is the number of frames handed to PulseAudio.
pub struct PulsePlayback {
    state: Arc<Mutex<MixerState>>,
    sample_rate: u32,
    next_id: SourceId,
    released: bool,
}

impl PlaybackDevice for PulsePlayback {
    fn current_time(&self) -> f64 {
        lock(&self.state).frames_written as f64 / self.sample_rate as f64
    }

    fn play_at(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<SourceId> {
        if self.released {
            return Err(Error::InvalidState("playback context released"));
        }
        if buffer.sample_rate != self.sample_rate {
            warn!(
                "Buffer rate {}Hz differs from context rate {}Hz",
                buffer.sample_rate, self.sample_rate
            );
        }

        let id = self.next_id;
        self.next_id += 1;

        let start_frame = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        let samples = buffer.channel_data(0).to_vec();
        lock(&self.state).add(Source {
            id,
            start_frame,
            samples,
        });
        Ok(id)
    }

    fn stop_source(&mut self, id: SourceId) {
        lock(&self.state).stop(id);
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            lock(&self.state).draining = true;
            info!("Playback context released");
        }
    }
}

impl Drop for PulsePlayback {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mix every source overlapping `[start, start + out.len())` into `out`.
fn mix_into(sources: &[Source], start: u64, out: &mut [f32]) {
    let end = start + out.len() as u64;
    for source in sources {
        if source.start_frame >= end || source.end_frame() <= start {
            continue;
        }
        let from = source.start_frame.max(start);
        let to = source.end_frame().min(end);
        for frame in from..to {
            out[(frame - start) as usize] += source.samples[(frame - source.start_frame) as usize];
        }
    }
}

fn playback_loop(
    app_name: String,
    sample_rate: u32,
    state: Arc<Mutex<MixerState>>,
    ready: oneshot::Sender<Result<()>>,
) {
    let spec = pulse::sample::Spec {
        format: pulse::sample::Format::S16le,
        channels: 1,
        rate: sample_rate,
    };

    // keep the server-side queue short so a flush silences playback quickly
    let buffer_attr = pulse::def::BufferAttr {
        maxlength: u32::MAX,
        tlength: PLAYBACK_QUEUE_BLOCKS * (MIX_BLOCK_FRAMES * std::mem::size_of::<i16>()) as u32,
        prebuf: u32::MAX,
        minreq: u32::MAX,
        fragsize: u32::MAX,
    };

    let output = match psimple::Simple::new(
        None,
        &app_name,
        pulse::stream::Direction::Playback,
        None,
        "assistant voice",
        &spec,
        None,
        Some(&buffer_attr),
    ) {
        Ok(output) => {
            let _ = ready.send(Ok(()));
            output
        }
        Err(e) => {
            let _ = ready.send(Err(Error::device(format!("failed to open playback: {}", e))));
            return;
        }
    };

    let mut block = vec![0f32; MIX_BLOCK_FRAMES];
    loop {
        let next = lock(&state).next_block(&mut block);
        let Some(flush) = next else {
            break;
        };
        if flush {
            debug!("Flushing queued playback");
            if let Err(e) = output.flush() {
                warn!("Playback flush failed: {}", e);
            }
        }

        // blocks on the server's buffer, which paces the clock
        if let Err(e) = output.write(&codec::float_samples_to_pcm_bytes(&block)) {
            error!("Playback write error: {}", e);
            break;
        }
    }

    if let Err(e) = output.drain() {
        warn!("Playback drain failed: {}", e);
    }
    debug!("Playback thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_overlapping_sources() {
        let sources = vec![
            Source {
                id: 0,
                start_frame: 2,
                samples: vec![0.25; 4],
            },
            Source {
                id: 1,
                start_frame: 4,
                samples: vec![0.5; 8],
            },
        ];

        let mut out = vec![0.0; 8];
        mix_into(&sources, 0, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.25, 0.25, 0.75, 0.75, 0.5, 0.5]);

        let mut out = vec![0.0; 4];
        mix_into(&sources, 10, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);
    }

    fn ramp(id: SourceId, start_frame: u64, len: usize) -> Source {
        Source {
            id,
            start_frame,
            samples: (1..=len).map(|i| i as f32 / 1000.0).collect(),
        }
    }

    #[test]
    fn test_late_source_starts_at_mixer_clock() {
        let mut state = MixerState {
            frames_written: 960,
            ..Default::default()
        };
        // scheduled at a clock reading taken one block ago
        state.add(ramp(0, 480, 100));

        let mut out = vec![0.0; MIX_BLOCK_FRAMES];
        assert_eq!(state.next_block(&mut out), Some(false));
        assert_eq!(out[0], 0.001);
        assert_eq!(out[99], 0.1);
        assert_eq!(out[100], 0.0);
    }

    #[test]
    fn test_stopping_a_written_source_flushes() {
        let mut state = MixerState::default();
        state.add(ramp(0, 0, 2000));
        state.add(ramp(1, 5000, 100));

        let mut out = vec![0.0; MIX_BLOCK_FRAMES];
        assert_eq!(state.next_block(&mut out), Some(false));
        assert_eq!(state.next_block(&mut out), Some(false));

        // not yet written: nothing to flush
        state.stop(1);
        assert!(!state.flush_requested);

        state.stop(0);
        assert_eq!(state.next_block(&mut out), Some(true));
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(state.next_block(&mut out), Some(false));
    }

    #[test]
    fn test_release_drains_then_ends() {
        let mut state = MixerState::default();
        state.add(ramp(0, 0, 600));
        state.draining = true;

        let mut out = vec![0.0; MIX_BLOCK_FRAMES];
        assert_eq!(state.next_block(&mut out), Some(false));
        assert_eq!(state.next_block(&mut out), Some(false));
        assert_eq!(out[119], 0.6);
        assert_eq!(state.next_block(&mut out), None);
    }
}
