//! FFmpeg-backed media source.
//!
//! Demuxes with libavformat, decodes the best video stream (hardware first
//! when enabled, see [`crate::decode::hwaccel`]) and the best audio stream.
//! Video is converted to RGB24, audio to interleaved f32 at the stream's own
//! rate and channel layout.

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::Parameters;
use ffmpeg::format::{self, Pixel, Sample};
use ffmpeg::software::{resampling, scaling};
use ffmpeg::{decoder, frame, media, ChannelLayout, Packet, Rational};

use crate::core::time::{self, Seconds};
use crate::core::PlayerConfig;
use crate::decode::frame::{AudioChunk, RawFrame, SampleLayout, VideoImage};
use crate::decode::hwaccel::{self, DecoderCandidate};
use crate::decode::source::{DecodeError, MediaSource};
use crate::decode::stream_info::{AudioStreamInfo, MediaInfo};

/// Packets read while proving a hardware decoder before giving up on it
const PROBE_PACKETS: usize = 64;

/// Container-level timestamps are in microseconds
const CONTAINER_TIME_BASE: i32 = time::constants::MICROS_PER_SECOND as i32;

fn ffmpeg_error(e: ffmpeg::Error) -> DecodeError {
    DecodeError::FFmpeg(e.to_string())
}

/// Time base and start offset of one stream
#[derive(Debug, Clone, Copy)]
struct StreamClock {
    time_base: Rational,
    start: i64,
}

impl StreamClock {
    fn new(time_base: Rational, start: i64) -> Self {
        let start = if start == ffmpeg::ffi::AV_NOPTS_VALUE { 0 } else { start };
        Self { time_base, start }
    }

    fn seconds(&self, ticks: i64) -> Seconds {
        time::ticks_to_seconds(ticks - self.start, self.time_base.numerator(), self.time_base.denominator())
    }
}

struct VideoState {
    index: usize,
    decoder: decoder::Video,
    clock: StreamClock,
    scaler: Option<scaling::Context>,
    frame_interval: Seconds,
    last_timestamp: Option<Seconds>,
}

struct AudioState {
    index: usize,
    decoder: decoder::Audio,
    clock: StreamClock,
    resampler: resampling::Context,
    channels: u16,
    sample_rate: u32,
}

pub struct FfmpegSource {
    input: format::context::Input,
    video: VideoState,
    audio: Option<AudioState>,
    info: MediaInfo,
    backend: String,
    pending: VecDeque<RawFrame>,
    drained: bool,
}

impl FfmpegSource {
    /// Open `path` and set up decoders for its best video and audio streams
    pub fn open(path: &Path, config: &PlayerConfig) -> Result<Self, DecodeError> {
        ffmpeg::init().map_err(ffmpeg_error)?;
        if !path.exists() {
            return Err(DecodeError::FileNotFound(path.to_path_buf()));
        }
        let mut input = format::input(&path).map_err(ffmpeg_error)?;

        let (video_index, video_parameters, video_clock, frame_rate) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or(DecodeError::NoVideoStream)?;
            let rate = stream.avg_frame_rate();
            let rate = if rate.numerator() > 0 && rate.denominator() > 0 {
                rate
            } else {
                stream.rate()
            };
            (
                stream.index(),
                stream.parameters(),
                StreamClock::new(stream.time_base(), stream.start_time()),
                f64::from(rate),
            )
        };
        let audio_stream = input
            .streams()
            .best(media::Type::Audio)
            .map(|s| (s.index(), s.parameters(), StreamClock::new(s.time_base(), s.start_time())));

        let codec_name = video_parameters.id().name().to_string();
        let (video_decoder, backend) =
            open_video_decoder(&mut input, video_index, &video_parameters, &codec_name, config)?;

        let audio = match audio_stream {
            Some((index, parameters, clock)) => match open_audio(index, parameters, clock) {
                Ok(state) => Some(state),
                Err(e) => {
                    log::warn!("Ignoring undecodable audio stream: {}", e);
                    None
                }
            },
            None => None,
        };

        let duration = if input.duration() > 0 {
            time::ticks_to_seconds(input.duration(), 1, CONTAINER_TIME_BASE)
        } else {
            0.0
        };

        let info = MediaInfo {
            duration,
            frame_rate,
            width: video_decoder.width(),
            height: video_decoder.height(),
            codec_name,
            audio: audio.as_ref().map(|a| AudioStreamInfo {
                sample_rate: a.sample_rate,
                channels: a.channels,
            }),
        };
        log::info!(
            "Opened {}: {}x{} @ {:.2} fps, {}, audio: {}",
            path.display(),
            info.width,
            info.height,
            info.frame_rate,
            time::format_time(info.duration),
            info.has_audio()
        );

        Ok(Self {
            input,
            video: VideoState {
                index: video_index,
                decoder: video_decoder,
                clock: video_clock,
                scaler: None,
                frame_interval: info.frame_interval(),
                last_timestamp: None,
            },
            audio,
            info,
            backend,
            pending: VecDeque::new(),
            drained: false,
        })
    }

    fn decode_packet(&mut self, index: usize, packet: &Packet) -> Result<(), DecodeError> {
        if index == self.video.index {
            self.video
                .decoder
                .send_packet(packet)
                .map_err(|e| DecodeError::Decode(e.to_string()))?;
            self.receive_video()
        } else if let Some(audio) = self.audio.as_mut().filter(|a| a.index == index) {
            if let Err(e) = audio.decoder.send_packet(packet) {
                // a damaged audio packet is not worth stopping playback for
                log::debug!("Skipping audio packet: {}", e);
                return Ok(());
            }
            self.receive_audio()
        } else {
            Ok(())
        }
    }

    /// Drain every frame the video decoder has ready
    fn receive_video(&mut self) -> Result<(), DecodeError> {
        let mut decoded = frame::Video::empty();
        while self.video.decoder.receive_frame(&mut decoded).is_ok() {
            let timestamp = match decoded.timestamp() {
                Some(ticks) => self.video.clock.seconds(ticks),
                None => self
                    .video
                    .last_timestamp
                    .map_or(0.0, |last| last + self.video.frame_interval),
            };
            self.video.last_timestamp = Some(timestamp);
            let image = self.video.to_rgb24(&decoded)?;
            self.pending.push_back(RawFrame::Video { timestamp, image });
        }
        Ok(())
    }

    /// Drain every frame the audio decoder has ready
    fn receive_audio(&mut self) -> Result<(), DecodeError> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };
        let mut decoded = frame::Audio::empty();
        while audio.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(ticks) = decoded.timestamp() else {
                continue;
            };
            let timestamp = audio.clock.seconds(ticks);
            let mut converted = frame::Audio::empty();
            if let Err(e) = audio.resampler.run(&decoded, &mut converted) {
                log::debug!("Skipping audio frame at {:.3}s: {}", timestamp, e);
                continue;
            }
            let samples = packed_samples(&converted, audio.channels);
            self.pending.push_back(RawFrame::Audio {
                timestamp,
                chunk: AudioChunk {
                    samples,
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    layout: SampleLayout::Interleaved,
                },
            });
        }
        Ok(())
    }

    /// Signal end of input to both decoders and collect what they held back
    fn flush_decoders(&mut self) -> Result<(), DecodeError> {
        if self.video.decoder.send_eof().is_ok() {
            self.receive_video()?;
        }
        let audio_flushed = self.audio.as_mut().is_some_and(|a| a.decoder.send_eof().is_ok());
        if audio_flushed {
            self.receive_audio()?;
        }
        Ok(())
    }
}

impl VideoState {
    fn to_rgb24(&mut self, decoded: &frame::Video) -> Result<VideoImage, DecodeError> {
        let (width, height, format) = (decoded.width(), decoded.height(), decoded.format());
        let stale = self.scaler.as_ref().map_or(true, |s| {
            let input = s.input();
            input.width != width || input.height != height || input.format != format
        });
        if stale {
            self.scaler = Some(
                scaling::Context::get(format, width, height, Pixel::RGB24, width, height, scaling::Flags::BILINEAR)
                    .map_err(ffmpeg_error)?,
            );
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(DecodeError::FFmpeg("scaler unavailable".to_string()));
        };

        let mut rgb = frame::Video::empty();
        scaler.run(decoded, &mut rgb).map_err(ffmpeg_error)?;

        let row_bytes = width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            data.extend_from_slice(&plane[start..start + row_bytes]);
        }
        Ok(VideoImage::rgb24(data, width, height))
    }
}

/// Copy interleaved f32 samples out of a packed frame
fn packed_samples(frame: &frame::Audio, channels: u16) -> Vec<f32> {
    let count = frame.samples() * channels as usize;
    frame
        .data(0)
        .chunks_exact(4)
        .take(count)
        .map(|bytes| f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn open_audio(index: usize, parameters: Parameters, clock: StreamClock) -> Result<AudioState, DecodeError> {
    let context = ffmpeg::codec::context::Context::from_parameters(parameters).map_err(ffmpeg_error)?;
    let decoder = context
        .decoder()
        .audio()
        .map_err(|e| DecodeError::CodecOpenFailed(e.to_string()))?;

    let channels = decoder.channels();
    let layout = if decoder.channel_layout().is_empty() {
        ChannelLayout::default(i32::from(channels))
    } else {
        decoder.channel_layout()
    };
    let resampler = resampling::Context::get(
        decoder.format(),
        layout,
        decoder.rate(),
        Sample::F32(format::sample::Type::Packed),
        layout,
        decoder.rate(),
    )
    .map_err(ffmpeg_error)?;

    Ok(AudioState {
        index,
        sample_rate: decoder.rate(),
        channels,
        decoder,
        clock,
        resampler,
    })
}

/// Open the video decoder, preferring a hardware candidate that can decode
/// a real frame of this stream
fn open_video_decoder(
    input: &mut format::context::Input,
    index: usize,
    parameters: &Parameters,
    codec_name: &str,
    config: &PlayerConfig,
) -> Result<(decoder::Video, String), DecodeError> {
    if config.hardware_decoding {
        let candidates = hwaccel::decoder_candidates(codec_name, &config.hw_backends);
        let chosen = hwaccel::select_first(&candidates, |candidate| {
            probe_candidate(input, index, parameters, candidate)
        });
        if let Some((candidate, decoder)) = chosen {
            return Ok((decoder, candidate.description()));
        }
        log::info!("No hardware decoder accepted {}, using software decoding", codec_name);
    }

    let context = ffmpeg::codec::context::Context::from_parameters(parameters.clone()).map_err(ffmpeg_error)?;
    let decoder = context
        .decoder()
        .video()
        .map_err(|e| DecodeError::CodecOpenFailed(e.to_string()))?;
    Ok((decoder, format!("software ({})", codec_name)))
}

/// Open `candidate` and decode one frame with it, then rewind the input
fn probe_candidate(
    input: &mut format::context::Input,
    index: usize,
    parameters: &Parameters,
    candidate: &DecoderCandidate,
) -> Result<decoder::Video, DecodeError> {
    let codec = decoder::find_by_name(&candidate.decoder_name)
        .ok_or_else(|| DecodeError::CodecNotFound(candidate.decoder_name.clone()))?;
    let context = ffmpeg::codec::context::Context::from_parameters(parameters.clone()).map_err(ffmpeg_error)?;
    let mut video = context
        .decoder()
        .open_as(codec)
        .and_then(|opened| opened.video())
        .map_err(|e| DecodeError::CodecOpenFailed(e.to_string()))?;

    // the next candidate (or the software decoder) must start from the top
    let proven = hwaccel::probe_rewound(
        input,
        |input| {
            let mut decoded = frame::Video::empty();
            for (stream, packet) in input.packets().take(PROBE_PACKETS) {
                if stream.index() != index {
                    continue;
                }
                video.send_packet(&packet).map_err(|e| DecodeError::Decode(e.to_string()))?;
                if video.receive_frame(&mut decoded).is_ok() {
                    return Ok(true);
                }
            }
            Ok(false)
        },
        |input| input.seek(0, ..0).map_err(|e| DecodeError::SeekFailed(e.to_string())),
    )?;
    if !proven {
        return Err(DecodeError::Decode(format!(
            "{} produced no frame from the first {} packets",
            candidate.decoder_name, PROBE_PACKETS
        )));
    }
    video.flush();
    Ok(video)
}

impl MediaSource for FfmpegSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn backend(&self) -> &str {
        &self.backend
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, DecodeError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.drained {
                return Ok(None);
            }
            let next = self.input.packets().next().map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) => self.decode_packet(index, &packet)?,
                None => {
                    self.flush_decoders()?;
                    self.drained = true;
                }
            }
        }
    }

    fn seek(&mut self, seconds: Seconds) -> Result<(), DecodeError> {
        let target = time::seconds_to_ticks(seconds, 1, CONTAINER_TIME_BASE);
        self.input
            .seek(target, ..target)
            .map_err(|e| DecodeError::SeekFailed(e.to_string()))?;
        self.video.decoder.flush();
        self.video.last_timestamp = None;
        if let Some(audio) = self.audio.as_mut() {
            audio.decoder.flush();
        }
        self.pending.clear();
        self.drained = false;
        Ok(())
    }
}
