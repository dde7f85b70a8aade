//! Deterministic test-pattern source.
//!
//! Generates a video ramp and an optional sine tone with exact timestamps.
//! Used by the test suite and by the player binary when no real media is at
//! hand. Video comes out as RGBA8 (the engine normalizes it) and audio as
//! planar f32, like most real decoders.

use std::time::Duration;

use crate::core::time::{self, Seconds};
use crate::decode::frame::{AudioChunk, PixelLayout, RawFrame, SampleLayout, VideoImage};
use crate::decode::source::{DecodeError, MediaSource};
use crate::decode::stream_info::{AudioStreamInfo, MediaInfo};

const SAMPLES_PER_CHUNK: usize = 1024;
const TONE_HZ: f64 = 440.0;

/// Builder-configured synthetic media
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    info: MediaInfo,
    gop: usize,
    reorder: bool,
    fail_at: Option<Seconds>,
    fail_seeks: bool,
    decode_cost: Option<Duration>,
    next_video: usize,
    next_audio: usize,
}

impl SyntheticSource {
    /// Video-only source of the given length and rate
    pub fn new(duration: Seconds, frame_rate: f64) -> Self {
        Self {
            info: MediaInfo {
                duration,
                frame_rate,
                width: 16,
                height: 9,
                codec_name: "synthetic".to_string(),
                audio: None,
            },
            gop: 15,
            reorder: false,
            fail_at: None,
            fail_seeks: false,
            decode_cost: None,
            next_video: 0,
            next_audio: 0,
        }
    }

    /// Add an audio track
    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.info.audio = Some(AudioStreamInfo {
            sample_rate,
            channels,
        });
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.info.width = width;
        self.info.height = height;
        self
    }

    /// Distance between seekable frames
    pub fn with_gop(mut self, gop: usize) -> Self {
        self.gop = gop.max(1);
        self
    }

    /// Emit video in I-P-B order (presentation order 0,2,1 per triplet)
    pub fn with_reordering(mut self) -> Self {
        self.reorder = true;
        self
    }

    /// Fail with a decode fault once video reaches `seconds`
    pub fn failing_at(mut self, seconds: Seconds) -> Self {
        self.fail_at = Some(seconds);
        self
    }

    /// Refuse every seek
    pub fn failing_seeks(mut self) -> Self {
        self.fail_seeks = true;
        self
    }

    /// Sleep this long per decoded frame
    pub fn with_decode_cost(mut self, cost: Duration) -> Self {
        self.decode_cost = Some(cost);
        self
    }

    fn video_frame_count(&self) -> usize {
        (self.info.duration * self.info.frame_rate).round().max(0.0) as usize
    }

    fn audio_chunk_count(&self) -> usize {
        match self.info.audio {
            Some(audio) => {
                let total = (self.info.duration * audio.sample_rate as f64).round() as usize;
                total.div_ceil(SAMPLES_PER_CHUNK)
            }
            None => 0,
        }
    }

    /// Presentation index of the n-th emitted video frame
    fn video_index(&self, emitted: usize) -> usize {
        let total = self.video_frame_count();
        if !self.reorder {
            return emitted;
        }
        let base = emitted - emitted % 3;
        if base + 2 >= total {
            return emitted;
        }
        match emitted % 3 {
            0 => base,
            1 => base + 2,
            _ => base + 1,
        }
    }

    fn audio_timestamp(&self, index: usize) -> Seconds {
        match self.info.audio {
            Some(audio) => (index * SAMPLES_PER_CHUNK) as f64 / audio.sample_rate as f64,
            None => 0.0,
        }
    }

    fn render_video(&self, index: usize) -> VideoImage {
        let pixels = (self.info.width * self.info.height) as usize;
        let shade = (index % 256) as u8;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&[shade, shade.wrapping_mul(3), 255 - shade, 255]);
        }
        VideoImage {
            data,
            width: self.info.width,
            height: self.info.height,
            layout: PixelLayout::Rgba8,
        }
    }

    fn render_audio(&self, index: usize, audio: AudioStreamInfo) -> AudioChunk {
        let total = (self.info.duration * audio.sample_rate as f64).round() as usize;
        let first = index * SAMPLES_PER_CHUNK;
        let count = SAMPLES_PER_CHUNK.min(total.saturating_sub(first));
        let mut samples = Vec::with_capacity(count * audio.channels as usize);
        for _channel in 0..audio.channels {
            for n in first..first + count {
                let t = n as f64 / audio.sample_rate as f64;
                samples.push((0.5 * (t * TONE_HZ * std::f64::consts::TAU).sin()) as f32);
            }
        }
        AudioChunk {
            samples,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            layout: SampleLayout::Planar,
        }
    }
}

impl MediaSource for SyntheticSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn backend(&self) -> &str {
        "synthetic"
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, DecodeError> {
        if let Some(cost) = self.decode_cost {
            std::thread::sleep(cost);
        }

        let video = (self.next_video < self.video_frame_count()).then(|| {
            let index = self.video_index(self.next_video);
            (index, time::from_frame_index(index, self.info.frame_rate))
        });
        let audio = match self.info.audio {
            Some(info) if self.next_audio < self.audio_chunk_count() => {
                Some((self.next_audio, self.audio_timestamp(self.next_audio), info))
            }
            _ => None,
        };

        match (video, audio) {
            (video, Some((index, timestamp, info)))
                if video.map_or(true, |(_, video_ts)| timestamp <= video_ts) =>
            {
                self.next_audio += 1;
                Ok(Some(RawFrame::Audio {
                    timestamp,
                    chunk: self.render_audio(index, info),
                }))
            }
            (Some((index, timestamp)), _) => {
                if let Some(fail_at) = self.fail_at {
                    if timestamp >= fail_at {
                        return Err(DecodeError::Decode(format!(
                            "corrupt packet at {}",
                            time::format_time(timestamp)
                        )));
                    }
                }
                self.next_video += 1;
                Ok(Some(RawFrame::Video {
                    timestamp,
                    image: self.render_video(index),
                }))
            }
            _ => Ok(None),
        }
    }

    fn seek(&mut self, seconds: Seconds) -> Result<(), DecodeError> {
        if self.fail_seeks {
            return Err(DecodeError::SeekFailed("source is not seekable".to_string()));
        }
        let target = time::to_frame_index(time::clamp_position(seconds, self.info.duration), self.info.frame_rate);
        let keyframe = target - target % self.gop;
        let keyframe_ts = time::from_frame_index(keyframe, self.info.frame_rate);

        self.next_video = keyframe;
        self.next_audio = match self.info.audio {
            Some(audio) => (keyframe_ts * audio.sample_rate as f64) as usize / SAMPLES_PER_CHUNK,
            None => 0,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut SyntheticSource) -> Vec<RawFrame> {
        std::iter::from_fn(|| source.next_frame().unwrap()).collect()
    }

    #[test]
    fn test_video_only_frame_count() {
        let mut source = SyntheticSource::new(10.0, 30.0);
        let frames = drain(&mut source);
        assert_eq!(frames.len(), 300);
        assert!(frames.iter().all(|f| f.kind() == crate::decode::StreamKind::Video));
        assert!((frames[299].timestamp() - 299.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_audio_is_interleaved_with_video_by_time() {
        let mut source = SyntheticSource::new(1.0, 30.0).with_audio(48_000, 2);
        let frames = drain(&mut source);
        let audio: Vec<&RawFrame> = frames.iter().filter(|f| f.kind() == crate::decode::StreamKind::Audio).collect();
        assert_eq!(audio.len(), 48_000usize.div_ceil(SAMPLES_PER_CHUNK));
        assert!(frames.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp() + 1.0 / 30.0));
    }

    #[test]
    fn test_reordering_emits_out_of_presentation_order() {
        let mut source = SyntheticSource::new(1.0, 30.0).with_reordering();
        let order: Vec<usize> = drain(&mut source)
            .iter()
            .map(|f| time::to_frame_index(f.timestamp(), 30.0))
            .collect();
        assert_eq!(&order[..6], &[0, 2, 1, 3, 5, 4]);
        assert_eq!(order.len(), 30);
    }

    #[test]
    fn test_seek_lands_on_keyframe_before_target() {
        let mut source = SyntheticSource::new(10.0, 30.0).with_gop(15);
        source.seek(5.2).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        // frame 156 -> keyframe 150 (5.0s)
        assert!((first.timestamp() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_injected_faults() {
        let mut source = SyntheticSource::new(1.0, 30.0).failing_at(0.5).failing_seeks();
        assert!(source.seek(0.0).is_err());
        let err = std::iter::repeat_with(|| source.next_frame())
            .find_map(|r| r.err())
            .unwrap();
        assert!(matches!(err, DecodeError::Decode(_)));
    }
}
