//! Video pacing loop.
//!
//! Each iteration reads the clock, works out the reference position (audio
//! position when audio is playing, otherwise wall clock) and lets the
//! [`VideoPacer`] consume frames up to it: frames lagging more than twice the
//! sync threshold are dropped, the first frame close enough is displayed and
//! a frame that is not yet due is held back for the next iteration.

use std::sync::Arc;
use std::thread;

use crate::core::time::Seconds;
use crate::decode::engine::{ConsumeError, DecoderEngine, StreamError};
use crate::decode::frame::VideoFrame;
use crate::playback::display::DisplaySurface;
use crate::playback::engine::PlaybackEngine;
use crate::playback::state::PlaybackState;
use crate::playback::sync::FpsCounter;

/// What one pacing pass did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaceReport {
    /// Timestamp of the frame handed to the display, if any
    pub presented: Option<Seconds>,
    pub dropped: u32,
    /// The video buffer stayed empty for the whole consume timeout
    pub starved: bool,
    /// A seek began mid-pass; the consumed frame was held back
    pub interrupted: bool,
}

/// Frame selection state of the video loop
#[derive(Debug)]
pub struct VideoPacer {
    sync_threshold: Seconds,
    max_consecutive_drops: u32,
    pending: Option<VideoFrame>,
    last_displayed: Option<Seconds>,
    consecutive_drops: u32,
    seek_mark: u64,
}

impl VideoPacer {
    pub fn new(sync_threshold: Seconds, max_consecutive_drops: u32) -> Self {
        Self {
            sync_threshold,
            max_consecutive_drops,
            pending: None,
            last_displayed: None,
            consecutive_drops: 0,
            seek_mark: 0,
        }
    }

    pub fn last_displayed(&self) -> Option<Seconds> {
        self.last_displayed
    }

    /// Whether the reference is still behind the frame on screen
    pub fn is_ahead_of(&self, reference: Seconds) -> bool {
        self.last_displayed.is_some_and(|shown| reference < shown)
    }

    /// Forget per-position state once the decoder has been repositioned
    fn follow_seeks(&mut self, decoder: &DecoderEngine) {
        let mark = decoder.seek_mark();
        if mark != self.seek_mark {
            self.seek_mark = mark;
            self.last_displayed = None;
            self.consecutive_drops = 0;
        }
    }

    /// Next frame decoded after the latest seek
    fn next_frame(&mut self, decoder: &DecoderEngine) -> Result<VideoFrame, ConsumeError> {
        loop {
            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => decoder.consume_video()?,
            };
            if decoder.is_current(&frame) {
                return Ok(frame);
            }
        }
    }

    fn present(&mut self, frame: VideoFrame, display: &mut dyn DisplaySurface) -> Seconds {
        let timestamp = frame.timestamp;
        self.last_displayed = Some(timestamp);
        self.consecutive_drops = 0;
        display.present(frame);
        timestamp
    }

    /// Consume frames up to `target`, dropping those that lag too far and
    /// displaying at most one. `interrupted` is polled after every consume.
    pub fn pace(
        &mut self,
        decoder: &DecoderEngine,
        target: Seconds,
        display: &mut dyn DisplaySurface,
        interrupted: &dyn Fn() -> bool,
    ) -> PaceReport {
        self.follow_seeks(decoder);
        let mut report = PaceReport::default();
        loop {
            let frame = match self.next_frame(decoder) {
                Ok(frame) => frame,
                Err(ConsumeError::NoMoreFrames) => {
                    report.starved = true;
                    return report;
                }
            };
            if interrupted() {
                self.pending = Some(frame);
                report.interrupted = true;
                return report;
            }
            if frame.timestamp > target {
                self.pending = Some(frame);
                return report;
            }

            let lag = target - frame.timestamp;
            if lag > 2.0 * self.sync_threshold && self.consecutive_drops < self.max_consecutive_drops {
                self.consecutive_drops += 1;
                report.dropped += 1;
                log::debug!("Dropping frame at {:.3}s ({:.3}s late)", frame.timestamp, lag);
                continue;
            }

            report.presented = Some(self.present(frame, display));
            return report;
        }
    }

    /// Display the next frame regardless of timing
    pub fn step(&mut self, decoder: &DecoderEngine, display: &mut dyn DisplaySurface) -> Option<Seconds> {
        self.follow_seeks(decoder);
        let frame = self.next_frame(decoder).ok()?;
        Some(self.present(frame, display))
    }
}

pub(crate) fn run(engine: Arc<PlaybackEngine>, mut display: Box<dyn DisplaySurface>) {
    let config = &engine.config;
    let frame_interval = engine.decoder.info().frame_interval();
    let nap = std::time::Duration::from_secs_f64(frame_interval / 4.0);
    let idle = config.idle_wait();
    let audio_clock = engine.has_audio_output();
    let mut pacer = VideoPacer::new(config.sync_threshold, config.max_consecutive_drops);
    let mut fps = FpsCounter::new();

    while let Some(snapshot) = engine.clock.snapshot() {
        match snapshot.state {
            PlaybackState::Ended if snapshot.looping => {
                // loop was switched on after the stream ended
                if let Err(e) = engine.restart_if(snapshot.epoch) {
                    log::warn!("Loop restart failed: {}", e);
                    engine.clock.wait(idle);
                }
                continue;
            }
            PlaybackState::Seeking | PlaybackState::Ended => {
                engine.clock.wait(idle);
                continue;
            }
            PlaybackState::Paused => {
                if snapshot.step_requested {
                    let shown = pacer.step(&engine.decoder, display.as_mut());
                    if shown.is_some() {
                        engine.clock.record_frames(1, 0);
                    }
                    engine.clock.finish_step(shown);
                } else {
                    engine.clock.wait(idle);
                }
                continue;
            }
            PlaybackState::Playing => {}
        }

        let reference = if audio_clock {
            engine.audio_reference(snapshot.audio_time)
        } else {
            snapshot.position
        };
        engine.clock.set_current_time_if(snapshot.epoch, reference);

        if pacer.is_ahead_of(reference) {
            thread::sleep(nap);
            continue;
        }

        let epoch = snapshot.epoch;
        let report = pacer.pace(&engine.decoder, reference, display.as_mut(), &|| {
            engine.clock.epoch() != epoch
        });
        let presented = u32::from(report.presented.is_some());
        engine.clock.record_frames(u64::from(presented), u64::from(report.dropped));
        if let Some(rate) = fps.tick(presented) {
            engine.clock.set_actual_fps(rate);
        }

        if report.starved {
            on_starved(&engine, epoch);
        } else if report.presented.is_none() && !report.interrupted {
            thread::sleep(nap);
        }
    }
    log::debug!("Video loop exiting");
}

/// Empty buffer: loop or end on end-of-stream, otherwise wait for the decoder
fn on_starved(engine: &PlaybackEngine, epoch: u64) {
    match engine.decoder.error() {
        Some(StreamError::EndOfStream) if engine.clock.is_looping() => {
            if let Err(e) = engine.restart_if(epoch) {
                log::warn!("Loop restart failed: {}", e);
                engine.clock.wait(engine.config.idle_wait());
            }
        }
        Some(StreamError::EndOfStream) => {
            if engine.clock.mark_ended_if(epoch) {
                log::info!("Playback ended");
            }
        }
        _ => engine.clock.wait(engine.config.idle_wait()),
    }
}
