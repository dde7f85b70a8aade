//! Audio output seam.
//!
//! The playback loops only need a streaming sink: queue PCM, ask how much is
//! still waiting to be heard, flush, pause and resume. The device-backed
//! implementation lives in [`crate::audio::player`]; [`ClockedSink`] drains
//! its queue against the wall clock and stands in for a device in headless
//! runs and tests.

use std::time::Instant;

use crate::audio::buffer::AudioBuffer;
use crate::core::time::Seconds;

/// Error type for audio output
#[derive(Debug, thiserror::Error)]
pub enum AudioSinkError {
    #[error("No audio device available")]
    NoDevice,
    #[error("Unsupported output format: {sample_rate} Hz, {channels} channels")]
    UnsupportedFormat { sample_rate: u32, channels: u16 },
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Audio output thread error: {0}")]
    Thread(String),
}

/// Streaming PCM output
pub trait AudioSink: Send {
    /// Append interleaved samples to the output queue
    fn queue(&mut self, buffer: &AudioBuffer) -> Result<(), AudioSinkError>;

    /// Audio queued but not yet played
    fn queued_duration(&self) -> Seconds;

    /// Drop everything queued
    fn clear(&mut self);

    fn pause(&mut self) -> Result<(), AudioSinkError>;

    fn resume(&mut self) -> Result<(), AudioSinkError>;
}

/// In-memory sink whose queue drains in real time
#[derive(Debug)]
pub struct ClockedSink {
    queued: Seconds,
    drained_at: Instant,
    paused: bool,
    samples_received: u64,
    last_block: Vec<f32>,
}

impl Default for ClockedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockedSink {
    pub fn new() -> Self {
        Self {
            queued: 0.0,
            drained_at: Instant::now(),
            paused: false,
            samples_received: 0,
            last_block: Vec::new(),
        }
    }

    fn pending_at(&self, now: Instant) -> Seconds {
        if self.paused {
            return self.queued;
        }
        let elapsed = now.saturating_duration_since(self.drained_at).as_secs_f64();
        (self.queued - elapsed).max(0.0)
    }

    /// Fold the time played so far into the stored queue length
    fn drain(&mut self) {
        let now = Instant::now();
        self.queued = self.pending_at(now);
        self.drained_at = now;
    }

    /// Total interleaved samples queued since creation
    pub fn samples_received(&self) -> u64 {
        self.samples_received
    }

    /// The most recently queued block
    pub fn last_block(&self) -> &[f32] {
        &self.last_block
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl AudioSink for ClockedSink {
    fn queue(&mut self, buffer: &AudioBuffer) -> Result<(), AudioSinkError> {
        self.drain();
        self.queued += buffer.duration();
        self.samples_received += buffer.data.len() as u64;
        self.last_block.clear();
        self.last_block.extend_from_slice(buffer.as_slice());
        Ok(())
    }

    fn queued_duration(&self) -> Seconds {
        self.pending_at(Instant::now())
    }

    fn clear(&mut self) {
        self.queued = 0.0;
        self.drained_at = Instant::now();
    }

    fn pause(&mut self) -> Result<(), AudioSinkError> {
        self.drain();
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioSinkError> {
        self.drained_at = Instant::now();
        self.paused = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn block(seconds: Seconds) -> AudioBuffer {
        let frames = (seconds * 1000.0) as usize;
        AudioBuffer {
            data: vec![0.25; frames * 2],
            sample_rate: 1000,
            channels: 2,
            timestamp: 0.0,
        }
    }

    #[test]
    fn test_queue_drains_in_real_time() {
        let mut sink = ClockedSink::new();
        sink.queue(&block(0.5)).unwrap();
        assert!(sink.queued_duration() > 0.4);
        thread::sleep(Duration::from_millis(100));
        let queued = sink.queued_duration();
        assert!(queued < 0.45 && queued > 0.2, "queued {queued}");
        assert_eq!(sink.samples_received(), 1000);
    }

    #[test]
    fn test_pause_freezes_queue() {
        let mut sink = ClockedSink::new();
        sink.queue(&block(0.5)).unwrap();
        sink.pause().unwrap();
        let frozen = sink.queued_duration();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.queued_duration(), frozen);
        sink.resume().unwrap();
        assert!(!sink.is_paused());
    }

    #[test]
    fn test_clear_empties_queue() {
        let mut sink = ClockedSink::new();
        sink.queue(&block(1.0)).unwrap();
        sink.clear();
        assert_eq!(sink.queued_duration(), 0.0);
        assert_eq!(sink.last_block().len(), 2000);
    }
}
