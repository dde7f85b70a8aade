//! Sink-ready PCM blocks.
//! Audio reaching the output device is interleaved f32 (L, R, L, R, ...).

use crate::core::time::Seconds;
use crate::decode::frame::{AudioChunk, SampleLayout};

/// Interleaved, volume-scaled samples ready to be queued on a sink
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub data: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Timestamp of the first sample
    pub timestamp: Seconds,
}

impl AudioBuffer {
    /// Interleave a decoded chunk and scale it by `volume`
    pub fn from_chunk(chunk: &AudioChunk, timestamp: Seconds, volume: f32) -> Self {
        let channels = chunk.channels.max(1) as usize;
        let mut data = match chunk.layout {
            SampleLayout::Interleaved => chunk.samples.clone(),
            SampleLayout::Planar => {
                let frames = chunk.samples.len() / channels;
                let mut interleaved = Vec::with_capacity(frames * channels);
                for frame in 0..frames {
                    for channel in 0..channels {
                        interleaved.push(chunk.samples[channel * frames + frame]);
                    }
                }
                interleaved
            }
        };

        let volume = volume.clamp(0.0, 1.0);
        if volume < 1.0 {
            for sample in &mut data {
                *sample *= volume;
            }
        }

        Self {
            data,
            sample_rate: chunk.sample_rate,
            channels: channels as u16,
            timestamp,
        }
    }

    /// Get the number of samples (per channel)
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> Seconds {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }

    /// Timestamp just past the last sample
    pub fn end_timestamp(&self) -> Seconds {
        self.timestamp + self.duration()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
