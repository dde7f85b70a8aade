//! Decoded frames and their payloads.
//! Video is stored as packed RGB24; audio as f32 samples.

use crate::core::time::Seconds;

/// A decoded unit tagged with its presentation timestamp and decode order
#[derive(Debug, Clone)]
pub struct Frame<T> {
    pub timestamp: Seconds,
    pub sequence_id: u64,
    pub payload: T,
}

/// Pixel layouts a source may hand to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb24,
    Rgba8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb24 => 3,
            PixelLayout::Rgba8 => 4,
        }
    }
}

/// Decoded video image
#[derive(Debug, Clone, PartialEq)]
pub struct VideoImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl VideoImage {
    pub fn rgb24(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            layout: PixelLayout::Rgb24,
        }
    }

    /// Normalize to packed RGB24, the only layout stored in the buffers
    pub fn into_rgb24(self) -> Self {
        match self.layout {
            PixelLayout::Rgb24 => self,
            PixelLayout::Rgba8 => {
                let data = self
                    .data
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect();
                Self {
                    data,
                    width: self.width,
                    height: self.height,
                    layout: PixelLayout::Rgb24,
                }
            }
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Channel arrangement of an audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// L R L R ...
    Interleaved,
    /// all of channel 0, then all of channel 1, ...
    Planar,
}

/// Decoded block of audio samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub layout: SampleLayout,
}

impl AudioChunk {
    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> Seconds {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Which buffer a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Frame as produced by a media source, before sequencing
#[derive(Debug, Clone)]
pub enum RawFrame {
    Video { timestamp: Seconds, image: VideoImage },
    Audio { timestamp: Seconds, chunk: AudioChunk },
}

impl RawFrame {
    pub fn timestamp(&self) -> Seconds {
        match self {
            RawFrame::Video { timestamp, .. } | RawFrame::Audio { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            RawFrame::Video { .. } => StreamKind::Video,
            RawFrame::Audio { .. } => StreamKind::Audio,
        }
    }
}

/// Frame types handed to consumers
pub type VideoFrame = Frame<VideoImage>;
pub type AudioFrame = Frame<AudioChunk>;
