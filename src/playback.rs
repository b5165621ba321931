//! Gapless scheduling of received audio chunks onto a playback device.

use crate::codec::AudioBuffer;
use crate::devices::{PlaybackDevice, SourceId};
use crate::error::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scheduled {
    id: SourceId,
    end: f64,
}

/// Schedules chunks back to back on a device clock.
///
/// Each chunk starts at `max(next_start_time, clock_now)`, so consecutive chunks play
/// without gaps while none is ever placed in the past. The cursor only moves forward
/// until [`interrupt`](Self::interrupt) cancels everything and resets it.
pub struct PlaybackScheduler<P> {
    device: P,
    next_start_time: f64,
    scheduled: Vec<Scheduled>,
}

impl<P: PlaybackDevice> PlaybackScheduler<P> {
    pub fn new(device: P) -> Self {
        Self {
            device,
            next_start_time: 0.0,
            scheduled: Vec::new(),
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Buffers scheduled that have not finished on the device clock.
    pub fn pending(&self) -> usize {
        let now = self.device.current_time();
        self.scheduled.iter().filter(|s| s.end > now).count()
    }

    /// Schedule `buffer` right after the previous chunk, returning its start time.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> Result<f64> {
        let now = self.device.current_time();
        self.scheduled.retain(|s| s.end > now);

        let duration = buffer.duration();
        if buffer.frames() == 0 {
            debug!("Skipping empty playback chunk");
            return Ok(self.next_start_time.max(now));
        }

        let start_at = self.next_start_time.max(now);
        let id = self.device.play_at(buffer, start_at)?;
        self.next_start_time = start_at + duration;
        self.scheduled.push(Scheduled {
            id,
            end: self.next_start_time,
        });

        debug!(
            "Scheduled chunk {} at {:.3}s for {:.3}s ({} pending)",
            id,
            start_at,
            duration,
            self.scheduled.len()
        );
        Ok(start_at)
    }

    /// Stop every scheduled buffer now and reset the cursor.
    pub fn interrupt(&mut self) {
        let count = self.scheduled.len();
        for scheduled in self.scheduled.drain(..) {
            self.device.stop_source(scheduled.id);
        }
        self.next_start_time = 0.0;
        debug!("Playback interrupted, {} buffers cancelled", count);
    }

    /// Hand the device back, dropping scheduling state but not the audio itself.
    pub fn into_device(self) -> P {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pcm_bytes_to_audio_buffer;

    #[derive(Default)]
    struct FakeClockDevice {
        now: f64,
        next_id: SourceId,
        played: Vec<(SourceId, f64, f64)>,
        stopped: Vec<SourceId>,
    }

    impl PlaybackDevice for FakeClockDevice {
        fn current_time(&self) -> f64 {
            self.now
        }

        fn play_at(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<SourceId> {
            let id = self.next_id;
            self.next_id += 1;
            self.played.push((id, start_at, buffer.duration()));
            Ok(id)
        }

        fn stop_source(&mut self, id: SourceId) {
            self.stopped.push(id);
        }

        fn release(&mut self) {}
    }

    fn chunk(seconds: f64) -> AudioBuffer {
        let frames = (seconds * 24000.0).round() as usize;
        pcm_bytes_to_audio_buffer(&vec![0u8; frames * 2], 24000, 1)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_consecutive_chunks_are_gapless() {
        let mut scheduler = PlaybackScheduler::new(FakeClockDevice {
            now: 1.0,
            ..Default::default()
        });

        let first = scheduler.schedule(chunk(0.5)).unwrap();
        // decode delay, but still before the first chunk ends
        scheduler.device.now = 1.2;
        let second = scheduler.schedule(chunk(0.3)).unwrap();

        assert!(close(first, 1.0));
        assert!(close(second, 1.5));
        assert!(close(scheduler.next_start_time(), 1.8));
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn test_start_times_never_in_the_past() {
        let mut scheduler = PlaybackScheduler::new(FakeClockDevice::default());
        let mut starts = Vec::new();
        for (now, len) in [(0.0, 0.2), (0.1, 0.4), (2.0, 0.1), (2.05, 0.25)] {
            scheduler.device.now = now;
            let start = scheduler.schedule(chunk(len)).unwrap();
            assert!(start >= now);
            starts.push(start);
        }

        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
        assert!(close(starts[1], 0.2));
        // the clock overtook the cursor
        assert!(close(starts[2], 2.0));
        assert!(close(starts[3], 2.1));
    }

    #[test]
    fn test_finished_buffers_are_pruned() {
        let mut scheduler = PlaybackScheduler::new(FakeClockDevice::default());
        scheduler.schedule(chunk(0.5)).unwrap();
        scheduler.schedule(chunk(0.5)).unwrap();

        scheduler.device.now = 0.75;
        assert_eq!(scheduler.pending(), 1);

        scheduler.schedule(chunk(0.1)).unwrap();
        assert_eq!(scheduler.scheduled.len(), 2);
    }

    #[test]
    fn test_interrupt_cancels_and_resets() {
        let mut scheduler = PlaybackScheduler::new(FakeClockDevice::default());
        scheduler.schedule(chunk(0.5)).unwrap();
        scheduler.schedule(chunk(0.5)).unwrap();
        scheduler.schedule(chunk(0.5)).unwrap();

        scheduler.device.now = 0.6;
        scheduler.interrupt();

        assert_eq!(scheduler.device.stopped, vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);

        let start = scheduler.schedule(chunk(0.2)).unwrap();
        assert!(close(start, 0.6));
    }

    #[test]
    fn test_empty_chunk_is_not_scheduled() {
        let mut scheduler = PlaybackScheduler::new(FakeClockDevice::default());
        scheduler.schedule(chunk(0.0)).unwrap();
        assert!(scheduler.device.played.is_empty());
        assert_eq!(scheduler.next_start_time(), 0.0);
    }
}
