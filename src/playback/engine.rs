//! State shared by the controller and the two playback loops.
//!
//! Owns the decoder engine, the playback clock and the audio sink, and
//! implements the operations more than one party performs: seeking (user or
//! loop restart), pause toggling and handing audio to the sink.
//!
//! Lock order: seek lock → clock → sink. The decoder's own locks are never
//! taken while the clock is held.

use std::sync::Mutex;

use crate::audio::buffer::AudioBuffer;
use crate::audio::sink::AudioSink;
use crate::core::lock;
use crate::core::time::{self, Seconds};
use crate::core::PlayerConfig;
use crate::decode::engine::DecoderEngine;
use crate::decode::frame::AudioFrame;
use crate::decode::source::DecodeError;
use crate::playback::state::PlaybackState;
use crate::playback::sync::PlaybackClock;

/// Error type for playback control
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("Decoder error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Frame stepping requires playback to be paused")]
    NotPaused,
    #[error("No frame available to step to")]
    NoFrame,
    #[error("Timed out waiting for the video loop")]
    Timeout,
    #[error("Playback is stopped")]
    Stopped,
    #[error("Thread error: {0}")]
    Thread(String),
}

pub(crate) struct PlaybackEngine {
    pub(crate) decoder: DecoderEngine,
    pub(crate) clock: PlaybackClock,
    pub(crate) config: PlayerConfig,
    sink: Option<Mutex<Box<dyn AudioSink>>>,
    seek_lock: Mutex<()>,
}

impl PlaybackEngine {
    pub(crate) fn new(decoder: DecoderEngine, sink: Option<Box<dyn AudioSink>>, config: PlayerConfig) -> Self {
        let clock = PlaybackClock::new(config.loop_playback, config.volume);
        Self {
            decoder,
            clock,
            config,
            sink: sink.map(Mutex::new),
            seek_lock: Mutex::new(()),
        }
    }

    /// Whether video paces against audio rather than the wall clock
    pub(crate) fn has_audio_output(&self) -> bool {
        self.sink.is_some() && self.decoder.info().has_audio()
    }

    /// Audio queued on the sink but not yet heard
    pub(crate) fn queued_audio(&self) -> Seconds {
        self.sink.as_ref().map_or(0.0, |sink| lock(sink).queued_duration())
    }

    /// Position currently audible, given the end of the last queued chunk
    pub(crate) fn audio_reference(&self, audio_time: Seconds) -> Seconds {
        audio_time - self.queued_audio() + self.config.audio_sync_offset
    }

    /// Clamp `value` to the stream and reposition everything there.
    /// Concurrent seeks run one after another, so the later one wins.
    pub(crate) fn seek(&self, value: Seconds) -> Result<Seconds, ControlError> {
        let _serial = lock(&self.seek_lock);
        if !self.clock.is_running() {
            return Err(ControlError::Stopped);
        }
        self.seek_locked(value)
    }

    /// Seek back to the start unless someone else seeked since `epoch`
    pub(crate) fn restart_if(&self, epoch: u64) -> Result<(), ControlError> {
        let _serial = lock(&self.seek_lock);
        if self.clock.epoch() != epoch || !self.clock.is_running() {
            return Ok(());
        }
        log::info!("Looping back to start");
        self.seek_locked(0.0).map(|_| ())
    }

    fn seek_locked(&self, value: Seconds) -> Result<Seconds, ControlError> {
        let target = time::clamp_position(value, self.decoder.info().duration);
        self.clock.begin_seek();

        if let Err(e) = self.decoder.seek(target) {
            self.clock.abort_seek();
            return Err(e.into());
        }

        {
            let mut clock = self.clock.lock();
            clock.finish_seek(target);
            if let Some(sink) = &self.sink {
                lock(sink).clear();
            }
        }
        self.clock.notify();
        log::info!("Seeked to {}", time::format_time(target));
        Ok(target)
    }

    /// Flip pause. Pausing pauses the sink. Resuming flushes it and, when
    /// video follows the audio, repositions at the paused position so the
    /// flushed audio does not count as heard. Returns the new pause flag.
    pub(crate) fn toggle_pause(&self) -> bool {
        let _serial = lock(&self.seek_lock);
        let realign = self.has_audio_output();
        let (paused, resume_at) = {
            let mut clock = self.clock.lock();
            let paused = clock.toggle_pause();
            if let Some(sink) = &self.sink {
                let mut sink = lock(sink);
                let result = if paused {
                    sink.pause()
                } else {
                    sink.clear();
                    sink.resume()
                };
                if let Err(e) = result {
                    log::warn!("Audio sink did not follow pause toggle: {}", e);
                }
            }
            let resume_at =
                (realign && !paused && clock.state() == PlaybackState::Playing).then(|| clock.current_time());
            if let Some(position) = resume_at {
                // the flushed audio was never heard
                clock.set_audio_time(position);
            }
            (paused, resume_at)
        };
        self.clock.notify();
        log::info!("Playback {}", if paused { "paused" } else { "resumed" });

        if let Some(position) = resume_at.filter(|_| self.clock.is_running()) {
            if let Err(e) = self.seek_locked(position) {
                log::warn!("Could not realign audio on resume: {}", e);
            }
        }
        paused
    }

    /// Hand one chunk to the sink, scaled by the current volume.
    ///
    /// Refused (returns false) when a seek or pause happened since `epoch`;
    /// the caller keeps the chunk for later.
    pub(crate) fn queue_audio(&self, epoch: u64, chunk: &AudioFrame) -> bool {
        let Some(sink) = &self.sink else {
            return true;
        };
        let mut clock = self.clock.lock();
        if !clock.accepts_audio(epoch) {
            return false;
        }
        let buffer = AudioBuffer::from_chunk(&chunk.payload, chunk.timestamp, clock.volume());
        match lock(sink).queue(&buffer) {
            Ok(()) => clock.set_audio_time(buffer.end_timestamp()),
            Err(e) => log::warn!("Dropping audio at {:.3}s: {}", chunk.timestamp, e),
        }
        true
    }

    /// Stop both loops and the decoder, then release the sink
    pub(crate) fn shutdown(&self) {
        self.clock.shutdown();
        self.decoder.stop();
        if let Some(sink) = &self.sink {
            let mut sink = lock(sink);
            sink.clear();
            if let Err(e) = sink.pause() {
                log::debug!("Audio sink pause on shutdown failed: {}", e);
            }
        }
    }
}
