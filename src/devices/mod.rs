//! Audio device seams used by the live session controller.
//!
//! The controller only talks to these traits; the PulseAudio backend lives in [`pulse`]
//! behind the `pulse` feature so the state machine can be driven by in-memory devices.

use crate::codec::AudioBuffer;
use crate::error::Result;
use std::future::Future;
use tokio::sync::mpsc;

#[cfg(feature = "pulse")]
pub mod pulse;

/// Microphone capture rate expected by the live model.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;
/// Rate of the model's synthesized audio.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;
/// Mono samples per capture block.
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Identifies one buffer handed to a [`PlaybackDevice`].
pub type SourceId = u64;

/// An open microphone stream plus its capture context.
///
/// Blocks are delivered on the receiver returned by [`AudioDevices::open_input`].
pub trait CaptureDevice: Send {
    /// Stop capturing and give the device back. Idempotent.
    fn release(&mut self);
}

/// An output context with its own clock, onto which buffers are scheduled.
pub trait PlaybackDevice: Send {
    /// Seconds elapsed on the device clock.
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `start_at` seconds on the device clock.
    fn play_at(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<SourceId>;

    /// Stop a scheduled or playing buffer immediately. Unknown ids are ignored.
    fn stop_source(&mut self, id: SourceId);

    /// Close the context once everything already scheduled has played out. Idempotent.
    fn release(&mut self);
}

/// Factory for the devices a live session holds while it runs.
///
/// Opening waits on the audio server, so both calls are async.
pub trait AudioDevices: Send {
    type Input: CaptureDevice;
    type Output: PlaybackDevice;

    /// Open the microphone at `sample_rate`, delivering mono blocks of `block_size` samples.
    fn open_input(
        &mut self,
        sample_rate: u32,
        block_size: usize,
    ) -> impl Future<Output = Result<(Self::Input, mpsc::Receiver<Vec<f32>>)>> + Send;

    /// Open a mono playback context at `sample_rate`.
    fn open_output(&mut self, sample_rate: u32) -> impl Future<Output = Result<Self::Output>> + Send;
}
