pub mod engine;
pub mod frame;
pub mod hwaccel;
pub mod queue;
pub mod source;
pub mod stream_info;
pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use engine::{ConsumeError, DecoderEngine, EngineOptions, StreamError};
pub use frame::{
    AudioChunk, AudioFrame, Frame, PixelLayout, RawFrame, SampleLayout, StreamKind, VideoFrame, VideoImage,
};
pub use hwaccel::{DecoderCandidate, HwBackend};
pub use queue::OrderedFrameQueue;
pub use source::{DecodeError, MediaSource};
pub use stream_info::{AudioStreamInfo, MediaInfo};
pub use synthetic::SyntheticSource;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;
