//! The demux/decode front end consumed by the decoder engine.

use std::path::PathBuf;

use crate::core::time::Seconds;
use crate::decode::frame::RawFrame;
use crate::decode::stream_info::MediaInfo;

/// Error type for decoding operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("No video stream found")]
    NoVideoStream,
    #[error("Codec not found: {0}")]
    CodecNotFound(String),
    #[error("Failed to open codec: {0}")]
    CodecOpenFailed(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Seek failed: {0}")]
    SeekFailed(String),
    #[error("FFmpeg error: {0}")]
    FFmpeg(String),
    #[error("Decoder thread error: {0}")]
    Thread(String),
}

/// A container plus its decoders, seen as "give me the next decoded frame"
/// and "seek to T".
///
/// Implementations are driven from the decoder engine's thread only.
pub trait MediaSource: Send {
    /// Metadata recorded when the source was opened
    fn info(&self) -> &MediaInfo;

    /// Human-readable name of the active video decode path
    fn backend(&self) -> &str;

    /// Decode the next frame of either stream. `Ok(None)` means end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, DecodeError>;

    /// Reposition at the nearest seek point at or before `seconds` and flush
    /// any decoder-internal buffering.
    fn seek(&mut self, seconds: Seconds) -> Result<(), DecodeError>;
}

impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    fn info(&self) -> &MediaInfo {
        (**self).info()
    }

    fn backend(&self) -> &str {
        (**self).backend()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, DecodeError> {
        (**self).next_frame()
    }

    fn seek(&mut self, seconds: Seconds) -> Result<(), DecodeError> {
        (**self).seek(seconds)
    }
}
