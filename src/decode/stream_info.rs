//! Stream metadata exposed by a media source.

use crate::core::time::{self, Seconds};

/// Audio-specific stream information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Read-only facts about an opened media source
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration: Seconds,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    pub codec_name: String,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Duration of one video frame
    pub fn frame_interval(&self) -> Seconds {
        time::frame_interval(self.frame_rate)
    }
}
