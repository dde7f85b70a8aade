//! User-facing playback control.
//!
//! `PlaybackController` opens the pipeline (decoder engine, video loop and,
//! when there is both an audio track and a sink, the audio loop) and exposes
//! pause, seek, frame stepping, volume and loop control. All threads stop
//! when the controller is stopped or dropped.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::audio::sink::AudioSink;
use crate::core::lock;
use crate::core::time::Seconds;
use crate::core::PlayerConfig;
use crate::decode::engine::{DecoderEngine, EngineOptions, StreamError};
use crate::decode::source::MediaSource;
use crate::decode::stream_info::MediaInfo;
use crate::playback::audio_loop;
use crate::playback::display::DisplaySurface;
use crate::playback::engine::{ControlError, PlaybackEngine};
use crate::playback::state::PlaybackState;
use crate::playback::sync::PlaybackStats;
use crate::playback::video_loop;

pub struct PlaybackController {
    engine: Arc<PlaybackEngine>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl PlaybackController {
    /// Start decoding `source` and playing it.
    ///
    /// Without a sink the audio track is not decoded and video paces
    /// against the wall clock.
    pub fn start(
        source: Box<dyn MediaSource>,
        sink: Option<Box<dyn AudioSink>>,
        display: Box<dyn DisplaySurface>,
        config: PlayerConfig,
    ) -> Result<Self, ControlError> {
        let options = EngineOptions::from_config(&config, sink.is_some());
        let decoder = DecoderEngine::start(source, options)?;
        let sink = if decoder.info().has_audio() { sink } else { None };
        let engine = Arc::new(PlaybackEngine::new(decoder, sink, config));

        let controller = Self {
            engine: Arc::clone(&engine),
            threads: Mutex::new(Vec::new()),
        };

        let video_engine = Arc::clone(&engine);
        controller.spawn("avpipe-video", move || video_loop::run(video_engine, display))?;
        if engine.has_audio_output() {
            let audio_engine = Arc::clone(&engine);
            controller.spawn("avpipe-audio", move || audio_loop::run(audio_engine))?;
        }

        log::info!(
            "Playback started ({}, clock: {})",
            crate::core::time::format_time(engine.decoder.info().duration),
            if engine.has_audio_output() { "audio" } else { "wall" }
        );
        Ok(controller)
    }

    fn spawn(&self, name: &str, body: impl FnOnce() + Send + 'static) -> Result<(), ControlError> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| {
                self.stop();
                ControlError::Thread(e.to_string())
            })?;
        lock(&self.threads).push(handle);
        Ok(())
    }

    /// Flip between playing and paused. Returns whether playback is now
    /// paused.
    pub fn toggle_pause(&self) -> bool {
        self.engine.toggle_pause()
    }

    /// Jump to `value` seconds, clamped to the stream. Returns the position
    /// actually sought to. On failure the position is unchanged.
    pub fn seek(&self, value: Seconds) -> Result<Seconds, ControlError> {
        self.engine.seek(value)
    }

    /// Seek relative to the current position. Ignored while paused.
    pub fn seek_relative(&self, delta: Seconds) -> Result<Option<Seconds>, ControlError> {
        if self.engine.clock.is_paused() {
            return Ok(None);
        }
        let from = self.engine.clock.current_time();
        self.seek(from + delta).map(Some)
    }

    /// Show the next (`direction > 0`) or previous (`direction < 0`) frame
    /// while paused and return its timestamp.
    ///
    /// Stepping back re-seeks one frame interval before the current position
    /// and steps forward from there, so it lands on the frame at or after
    /// that point rather than decoding in reverse.
    pub fn step_frame(&self, direction: i32) -> Result<Seconds, ControlError> {
        if !self.engine.clock.is_paused() || self.engine.clock.state().is_seeking() {
            return Err(ControlError::NotPaused);
        }
        // the video loop does not service steps once the stream has ended
        if self.engine.clock.state().is_ended() {
            return Err(ControlError::NoFrame);
        }
        if direction < 0 {
            let interval = self.engine.decoder.info().frame_interval();
            self.seek(self.engine.clock.current_time() - interval)?;
        }

        let ticket = self.engine.clock.request_step();
        match self.engine.clock.wait_step(ticket, self.step_timeout()) {
            Ok(Some(timestamp)) => Ok(timestamp),
            Ok(None) => Err(ControlError::NoFrame),
            Err(()) if !self.engine.clock.is_running() => Err(ControlError::Stopped),
            Err(()) => Err(ControlError::Timeout),
        }
    }

    fn step_timeout(&self) -> Duration {
        let config = &self.engine.config;
        config.consume_timeout() * 2 + config.idle_wait() + Duration::from_secs(1)
    }

    /// Clamp to [0, 1]; applies to audio queued from now on
    pub fn set_volume(&self, volume: f32) {
        self.engine.clock.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.engine.clock.volume()
    }

    pub fn toggle_loop(&self) -> bool {
        let looping = !self.engine.clock.is_looping();
        self.set_loop(looping);
        looping
    }

    pub fn set_loop(&self, looping: bool) {
        self.engine.clock.set_looping(looping);
        log::info!("Looping {}", if looping { "enabled" } else { "disabled" });
    }

    pub fn is_looping(&self) -> bool {
        self.engine.clock.is_looping()
    }

    pub fn state(&self) -> PlaybackState {
        self.engine.clock.state()
    }

    pub fn is_paused(&self) -> bool {
        self.engine.clock.is_paused()
    }

    /// Authoritative playback position
    pub fn current_time(&self) -> Seconds {
        self.engine.clock.current_time()
    }

    /// End of the last chunk handed to the audio sink
    pub fn audio_time(&self) -> Seconds {
        self.engine.clock.audio_time()
    }

    pub fn media_info(&self) -> &MediaInfo {
        self.engine.decoder.info()
    }

    /// Name of the active video decode path
    pub fn backend(&self) -> &str {
        self.engine.decoder.backend()
    }

    pub fn error(&self) -> Option<StreamError> {
        self.engine.decoder.error()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.engine.clock.stats()
    }

    /// One-line status: the decoder error if there is one, else the position
    pub fn status(&self) -> String {
        match self.engine.decoder.error() {
            Some(e) => format!("Error: {}", e),
            None => format!("Time: {:.2}s", self.current_time()),
        }
    }

    /// Target vs measured frame rate and position
    pub fn info(&self) -> String {
        let media = self.engine.decoder.info();
        format!(
            "Target FPS: {:.1} | Actual FPS: {:.1} | Time: {:.1}/{:.1}s",
            media.frame_rate,
            self.stats().actual_fps,
            self.current_time(),
            media.duration
        )
    }

    /// Stop both loops and the decoder and release the audio sink. Idempotent.
    pub fn stop(&self) {
        self.engine.shutdown();
        let handles: Vec<_> = lock(&self.threads).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("Playback thread panicked");
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::synthetic::SyntheticSource;
    use crate::playback::display::NullDisplay;
    use std::time::Instant;

    fn config() -> PlayerConfig {
        PlayerConfig {
            consume_timeout_ms: 100,
            idle_wait_ms: 10,
            ..PlayerConfig::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn start(source: SyntheticSource) -> PlaybackController {
        PlaybackController::start(Box::new(source), None, Box::new(NullDisplay), config()).unwrap()
    }

    #[test]
    fn test_step_requires_pause() {
        let controller = start(SyntheticSource::new(5.0, 30.0));
        assert_eq!(controller.step_frame(1), Err(ControlError::NotPaused));
    }

    #[test]
    fn test_step_forward_advances_one_frame() {
        let controller = start(SyntheticSource::new(5.0, 30.0));
        assert!(controller.toggle_pause());
        controller.seek(1.0).unwrap();

        let first = controller.step_frame(1).unwrap();
        assert!((first - 1.0).abs() < 1e-9);
        let second = controller.step_frame(1).unwrap();
        assert!((second - first - 1.0 / 30.0).abs() < 1e-9);
        assert_eq!(controller.current_time(), second);
        assert_eq!(controller.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_step_back_lands_on_previous_frame() {
        let controller = start(SyntheticSource::new(5.0, 30.0));
        assert!(controller.toggle_pause());
        controller.seek(2.0).unwrap();
        let shown = controller.step_frame(1).unwrap();

        let back = controller.step_frame(-1).unwrap();
        assert!((shown - back - 1.0 / 30.0).abs() < 1e-6, "{shown} -> {back}");
    }

    #[test]
    fn test_seek_is_clamped_to_stream() {
        let controller = start(SyntheticSource::new(3.0, 30.0));
        assert_eq!(controller.seek(-4.0).unwrap(), 0.0);
        assert_eq!(controller.seek(99.0).unwrap(), 3.0);
    }

    #[test]
    fn test_failed_seek_keeps_position() {
        let controller = start(SyntheticSource::new(3.0, 30.0).failing_seeks());
        assert!(controller.toggle_pause());
        let before = controller.current_time();
        assert!(controller.seek(2.0).is_err());
        assert_eq!(controller.current_time(), before);
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert!(controller.status().starts_with("Error: Seek fault"));
    }

    #[test]
    fn test_seek_relative_ignored_while_paused() {
        let controller = start(SyntheticSource::new(5.0, 30.0));
        controller.toggle_pause();
        assert_eq!(controller.seek_relative(2.0), Ok(None));
        controller.toggle_pause();
        let target = controller.seek_relative(2.0).unwrap().unwrap();
        assert!(target >= 2.0);
    }

    #[test]
    fn test_ends_without_loop() {
        let controller = start(SyntheticSource::new(0.5, 30.0));
        assert!(wait_until(|| controller.state() == PlaybackState::Ended));
        assert_eq!(controller.stats().frames_displayed + controller.stats().frames_dropped, 15);
        assert_eq!(controller.status(), "Error: End of stream");

        // a seek revives an ended stream
        controller.seek(0.0).unwrap();
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_step_after_end_fails_fast() {
        let controller = start(SyntheticSource::new(0.5, 30.0));
        assert!(wait_until(|| controller.state() == PlaybackState::Ended));
        assert!(controller.toggle_pause());

        let started = Instant::now();
        assert_eq!(controller.step_frame(1), Err(ControlError::NoFrame));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_enabling_loop_after_end_restarts() {
        let controller = start(SyntheticSource::new(0.5, 30.0));
        assert!(wait_until(|| controller.state() == PlaybackState::Ended));
        let shown = controller.stats().frames_displayed;

        controller.set_loop(true);
        assert!(wait_until(|| controller.state() != PlaybackState::Ended));
        assert!(wait_until(|| controller.stats().frames_displayed > shown));
    }

    #[test]
    fn test_volume_and_loop_accessors() {
        let controller = start(SyntheticSource::new(1.0, 30.0));
        controller.set_volume(1.7);
        assert_eq!(controller.volume(), 1.0);
        assert!(controller.toggle_loop());
        assert!(controller.is_looping());
        controller.set_loop(false);
        assert!(!controller.is_looping());
        assert!(controller.info().starts_with("Target FPS: 30.0 | Actual FPS:"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let controller = start(SyntheticSource::new(10.0, 30.0));
        controller.stop();
        controller.stop();
        assert_eq!(controller.seek(1.0), Err(ControlError::Stopped));
    }
}
