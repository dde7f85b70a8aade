//! avpipe - background media decoding with A/V synchronized playback.
//!
//! A producer thread decodes a [`decode::MediaSource`] into two
//! timestamp-ordered buffers under a bounded look-ahead. Two consumer loops
//! pace video against the audio position (or the wall clock when there is no
//! audio) and keep the audio sink fed. [`playback::PlaybackController`] ties
//! it together with pause, seek, frame stepping, volume and looping.
//!
//! ```no_run
//! use avpipe::core::PlayerConfig;
//! use avpipe::decode::SyntheticSource;
//! use avpipe::playback::{NullDisplay, PlaybackController};
//!
//! let source = SyntheticSource::new(10.0, 30.0).with_audio(48_000, 2);
//! let controller = PlaybackController::start(
//!     Box::new(source),
//!     Some(Box::new(avpipe::audio::ClockedSink::new())),
//!     Box::new(NullDisplay),
//!     PlayerConfig::default(),
//! )?;
//! controller.seek(5.0)?;
//! println!("{}", controller.status());
//! # Ok::<(), avpipe::playback::ControlError>(())
//! ```

pub mod audio;
pub mod core;
pub mod decode;
pub mod playback;
