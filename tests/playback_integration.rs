//! End-to-end behaviour of the decode and playback pipeline, driven by the
//! synthetic source so no codec library or audio device is needed.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use avpipe::audio::{AudioBuffer, AudioSink, AudioSinkError, ClockedSink};
use avpipe::core::{PlayerConfig, Seconds};
use avpipe::decode::{ConsumeError, DecoderEngine, EngineOptions, SyntheticSource, VideoFrame};
use avpipe::playback::{DisplaySurface, PlaybackController, PlaybackState};

const FRAME: Seconds = 1.0 / 30.0;

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn config() -> PlayerConfig {
    PlayerConfig {
        consume_timeout_ms: 100,
        idle_wait_ms: 10,
        ..PlayerConfig::default()
    }
}

/// Records the timestamp of every presented frame
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Seconds>>>);

impl Recorder {
    fn shown(&self) -> Vec<Seconds> {
        self.0.lock().unwrap().clone()
    }
}

impl DisplaySurface for Recorder {
    fn present(&mut self, frame: VideoFrame) {
        self.0.lock().unwrap().push(frame.timestamp);
    }
}

/// A clocked sink the test can still inspect after handing it over
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<ClockedSink>>);

impl AudioSink for SharedSink {
    fn queue(&mut self, buffer: &AudioBuffer) -> Result<(), AudioSinkError> {
        self.0.lock().unwrap().queue(buffer)
    }

    fn queued_duration(&self) -> Seconds {
        self.0.lock().unwrap().queued_duration()
    }

    fn clear(&mut self) {
        self.0.lock().unwrap().clear()
    }

    fn pause(&mut self) -> Result<(), AudioSinkError> {
        self.0.lock().unwrap().pause()
    }

    fn resume(&mut self) -> Result<(), AudioSinkError> {
        self.0.lock().unwrap().resume()
    }
}

#[test]
fn ten_second_clip_yields_every_frame_then_ends() {
    let engine = DecoderEngine::start(Box::new(SyntheticSource::new(10.0, 30.0)), EngineOptions::default()).unwrap();

    let mut last = -1.0;
    for _ in 0..300 {
        let frame = engine.consume_video().unwrap();
        assert!(frame.timestamp >= last);
        last = frame.timestamp;
    }
    assert!(last >= 9.9);
    assert_eq!(engine.consume_video().unwrap_err(), ConsumeError::NoMoreFrames);
    assert!(engine.is_end_of_stream());
}

#[test]
fn producer_stays_within_prefetch_window() {
    let source = SyntheticSource::new(30.0, 30.0).with_audio(48_000, 2);
    let options = EngineOptions {
        prefetch_duration: 0.5,
        ..EngineOptions::default()
    };
    let engine = DecoderEngine::start(Box::new(source), options).unwrap();

    assert!(wait_until(|| engine.max_timestamp_decoded() >= 0.45));
    thread::sleep(Duration::from_millis(100));
    assert!(engine.max_timestamp_decoded() - engine.max_timestamp_consumed() < 0.5 + FRAME);
    assert!(engine.buffered_video() <= 17);
}

#[test]
fn seek_lands_on_requested_frame() {
    let engine = DecoderEngine::start(Box::new(SyntheticSource::new(10.0, 30.0)), EngineOptions::default()).unwrap();
    engine.consume_video().unwrap();

    engine.seek(5.0).unwrap();
    let frame = engine.consume_video().unwrap();
    assert!((5.0..5.0 + FRAME).contains(&frame.timestamp), "got {}", frame.timestamp);
}

#[test]
fn playback_seek_shows_target_frame_next() {
    let recorder = Recorder::default();
    let config = PlayerConfig {
        sync_threshold: 0.1,
        ..config()
    };
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(10.0, 30.0)),
        None,
        Box::new(recorder.clone()),
        config,
    )
    .unwrap();
    assert!(wait_until(|| !recorder.shown().is_empty()));

    assert_eq!(controller.seek(5.0).unwrap(), 5.0);
    assert!(wait_until(|| recorder.shown().iter().any(|&t| t >= 4.5)));
    let first = recorder.shown().into_iter().find(|&t| t >= 4.5).unwrap();
    assert!((5.0..5.0 + FRAME).contains(&first), "first frame after seek: {first}");
    assert_eq!(controller.state(), PlaybackState::Playing);
}

#[test]
fn looping_restarts_from_zero() {
    let recorder = Recorder::default();
    let config = PlayerConfig {
        loop_playback: true,
        ..config()
    };
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(0.5, 30.0)),
        None,
        Box::new(recorder.clone()),
        config,
    )
    .unwrap();

    // a timestamp lower than its predecessor means playback wrapped
    assert!(wait_until(|| {
        let shown = recorder.shown();
        shown.windows(2).any(|w| w[1] < w[0] && w[1] < FRAME)
    }));
    assert_ne!(controller.state(), PlaybackState::Ended);
    assert!(controller.is_looping());
}

#[test]
fn pause_toggle_is_idempotent() {
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(10.0, 30.0)),
        None,
        Box::new(Recorder::default()),
        config(),
    )
    .unwrap();
    assert!(wait_until(|| controller.current_time() > 0.2));

    let before = controller.current_time();
    assert!(controller.toggle_pause());
    assert!(!controller.toggle_pause());
    assert!(!controller.is_paused());
    assert!((controller.current_time() - before).abs() < FRAME);

    assert!(controller.toggle_pause());
    let frozen = controller.current_time();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(controller.current_time(), frozen);
    assert_eq!(controller.state(), PlaybackState::Paused);
}

#[test]
fn pause_toggle_with_audio_does_not_skip_ahead() {
    let sink = SharedSink::default();
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(10.0, 30.0).with_audio(48_000, 2)),
        Some(Box::new(sink.clone())),
        Box::new(Recorder::default()),
        config(),
    )
    .unwrap();
    assert!(wait_until(|| controller.current_time() > 1.0));

    let before = controller.current_time();
    assert!(controller.toggle_pause());
    assert!(!controller.toggle_pause());
    assert!((controller.current_time() - before).abs() < FRAME);

    // the audio queued before the pause was flushed, not played
    thread::sleep(Duration::from_millis(30));
    let after = controller.current_time();
    assert!(after - before < 0.1, "jumped from {before} to {after}");
    assert_eq!(controller.state(), PlaybackState::Playing);
}

#[test]
fn audio_keeps_sink_between_watermarks() {
    let sink = SharedSink::default();
    let config = config();
    let high = config.audio_high_watermark;
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(10.0, 30.0).with_audio(48_000, 2)),
        Some(Box::new(sink.clone())),
        Box::new(Recorder::default()),
        config,
    )
    .unwrap();

    assert!(wait_until(|| controller.audio_time() > 0.5));
    let chunk = 1024.0 / 48_000.0;
    for _ in 0..20 {
        assert!(sink.queued_duration() <= high + chunk + 1e-3);
        thread::sleep(Duration::from_millis(10));
    }
    // video follows the audible position, not the end of the queue
    assert!(controller.current_time() <= controller.audio_time());
    assert!(controller.current_time() > 0.0);
}

#[test]
fn volume_applies_to_newly_queued_audio() {
    let sink = SharedSink::default();
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(10.0, 30.0).with_audio(48_000, 2)),
        Some(Box::new(sink.clone())),
        Box::new(Recorder::default()),
        config(),
    )
    .unwrap();
    assert!(wait_until(|| sink.0.lock().unwrap().samples_received() > 0));

    controller.set_volume(0.5);
    let received = sink.0.lock().unwrap().samples_received();
    assert!(wait_until(|| sink.0.lock().unwrap().samples_received() > received + 4096));
    let peak = sink
        .0
        .lock()
        .unwrap()
        .last_block()
        .iter()
        .fold(0.0f32, |peak, s| peak.max(s.abs()));
    // the test tone peaks at 0.5
    assert!(peak <= 0.25 + 1e-6, "peak {peak}");
    assert!(peak > 0.0);
}

#[test]
fn pausing_pauses_the_sink() {
    let sink = SharedSink::default();
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(10.0, 30.0).with_audio(48_000, 2)),
        Some(Box::new(sink.clone())),
        Box::new(Recorder::default()),
        config(),
    )
    .unwrap();

    controller.toggle_pause();
    assert!(sink.0.lock().unwrap().is_paused());
    controller.toggle_pause();
    assert!(!sink.0.lock().unwrap().is_paused());
}

#[test]
fn decode_fault_surfaces_in_status() {
    let controller = PlaybackController::start(
        Box::new(SyntheticSource::new(5.0, 30.0).failing_at(0.2)),
        None,
        Box::new(Recorder::default()),
        config(),
    )
    .unwrap();
    assert!(wait_until(|| controller.status().starts_with("Error: Decode fault")));
    // a fault is not end of stream, so playback never ends on its own
    thread::sleep(Duration::from_millis(100));
    assert_ne!(controller.state(), PlaybackState::Ended);
}
