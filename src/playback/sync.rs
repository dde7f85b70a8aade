//! The playback clock shared by the controller and both playback loops.
//!
//! Every scalar more than one loop reads (pause flag, positions, loop,
//! volume, seek epoch) lives in one [`ClockState`] behind one mutex. Changes
//! that a waiting loop should react to promptly (pause toggles, step
//! requests, finished seeks, shutdown) signal `changed`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::lock;
use crate::core::time::Seconds;
use crate::playback::state::PlaybackState;

/// Counters published by the video loop
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStats {
    pub frames_displayed: u64,
    pub frames_dropped: u64,
    /// Display rate measured over the last full one-second window
    pub actual_fps: f64,
}

/// Consistent copy of the clock taken under its lock
#[derive(Debug, Clone, Copy)]
pub struct ClockSnapshot {
    pub state: PlaybackState,
    /// Bumped at the start of every seek
    pub epoch: u64,
    /// Wall-clock playback position, frozen while paused
    pub position: Seconds,
    pub current_time: Seconds,
    pub audio_time: Seconds,
    pub volume: f32,
    pub looping: bool,
    pub step_requested: bool,
}

#[derive(Debug)]
pub(crate) struct ClockState {
    running: bool,
    paused: bool,
    seeking: bool,
    ended: bool,
    looping: bool,
    volume: f32,
    current_time: Seconds,
    /// End timestamp of the last chunk handed to the sink
    audio_time: Seconds,
    anchor_time: Seconds,
    anchor_instant: Instant,
    epoch: u64,
    step_requested: bool,
    steps_serviced: u64,
    last_step: Option<Seconds>,
    stats: PlaybackStats,
}

impl ClockState {
    fn new(looping: bool, volume: f32) -> Self {
        Self {
            running: true,
            paused: false,
            seeking: false,
            ended: false,
            looping,
            volume: volume.clamp(0.0, 1.0),
            current_time: 0.0,
            audio_time: 0.0,
            anchor_time: 0.0,
            anchor_instant: Instant::now(),
            epoch: 0,
            step_requested: false,
            steps_serviced: 0,
            last_step: None,
            stats: PlaybackStats::default(),
        }
    }

    fn wall_position(&self) -> Seconds {
        if self.paused {
            self.anchor_time
        } else {
            self.anchor_time + self.anchor_instant.elapsed().as_secs_f64()
        }
    }

    /// Restart the wall clock at `position`
    fn rebase(&mut self, position: Seconds) {
        self.anchor_time = position;
        self.anchor_instant = Instant::now();
        self.current_time = position;
    }

    pub(crate) fn state(&self) -> PlaybackState {
        PlaybackState::from_flags(self.paused, self.seeking, self.ended)
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn current_time(&self) -> Seconds {
        self.current_time
    }

    /// Flip the pause flag, keeping the position continuous. Returns the new
    /// value.
    pub(crate) fn toggle_pause(&mut self) -> bool {
        if self.paused {
            self.paused = false;
            let position = self.current_time;
            self.rebase(position);
        } else {
            let position = self.wall_position();
            self.anchor_time = position;
            self.paused = true;
        }
        self.paused
    }

    pub(crate) fn finish_seek(&mut self, target: Seconds) {
        self.seeking = false;
        self.ended = false;
        self.audio_time = target;
        self.rebase(target);
    }

    /// Record an audio hand-off. Only accepted while playing in `epoch`.
    pub(crate) fn accepts_audio(&self, epoch: u64) -> bool {
        self.running && self.epoch == epoch && !self.seeking && !self.paused
    }

    pub(crate) fn set_audio_time(&mut self, audio_time: Seconds) {
        self.audio_time = audio_time;
    }
}

/// Shared playback clock
#[derive(Debug)]
pub struct PlaybackClock {
    state: Mutex<ClockState>,
    changed: Condvar,
}

impl PlaybackClock {
    pub fn new(looping: bool, volume: f32) -> Self {
        Self {
            state: Mutex::new(ClockState::new(looping, volume)),
            changed: Condvar::new(),
        }
    }

    /// Hold the clock lock. Callers needing the sink too lock it after this.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ClockState> {
        lock(&self.state)
    }

    /// Wake every loop waiting in [`PlaybackClock::wait`]
    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    /// Current values, or `None` once the clock has been shut down
    pub fn snapshot(&self) -> Option<ClockSnapshot> {
        let state = self.lock();
        state.running.then(|| ClockSnapshot {
            state: state.state(),
            epoch: state.epoch,
            position: state.wall_position(),
            current_time: state.current_time,
            audio_time: state.audio_time,
            volume: state.volume,
            looping: state.looping,
            step_requested: state.step_requested,
        })
    }

    /// Idle until something changes or `timeout` elapses
    pub fn wait(&self, timeout: Duration) {
        let state = self.lock();
        if !state.running {
            return;
        }
        let _ = self
            .changed
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Tell both loops to exit
    pub fn shutdown(&self) {
        self.lock().running = false;
        self.notify();
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn current_time(&self) -> Seconds {
        self.lock().current_time
    }

    pub fn audio_time(&self) -> Seconds {
        self.lock().audio_time
    }

    /// Publish the position the video loop is pacing against, unless a seek
    /// started since `epoch` or playback was paused meanwhile
    pub fn set_current_time_if(&self, epoch: u64, position: Seconds) {
        let mut state = self.lock();
        if state.epoch == epoch && !state.seeking && !state.paused {
            state.current_time = position;
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn set_volume(&self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    pub fn is_looping(&self) -> bool {
        self.lock().looping
    }

    pub fn set_looping(&self, looping: bool) {
        self.lock().looping = looping;
    }

    /// Enter `Seeking` and invalidate work the loops started before now
    pub(crate) fn begin_seek(&self) -> u64 {
        let mut state = self.lock();
        state.seeking = true;
        state.epoch += 1;
        state.epoch
    }

    /// Leave `Seeking` without moving, after the decoder refused
    pub(crate) fn abort_seek(&self) {
        self.lock().seeking = false;
        self.notify();
    }

    /// Enter `Ended` unless a seek started since `epoch`
    pub fn mark_ended_if(&self, epoch: u64) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch || state.seeking || state.ended {
            return false;
        }
        state.ended = true;
        true
    }

    /// Queue one forward step and return the ticket to wait on
    pub(crate) fn request_step(&self) -> u64 {
        let ticket = {
            let mut state = self.lock();
            state.step_requested = true;
            state.steps_serviced + 1
        };
        self.notify();
        ticket
    }

    /// Record the frame a step displayed (`None` when nothing was available)
    pub(crate) fn finish_step(&self, shown: Option<Seconds>) {
        {
            let mut state = self.lock();
            if let Some(timestamp) = shown {
                state.rebase(timestamp);
            }
            state.step_requested = false;
            state.steps_serviced += 1;
            state.last_step = shown;
        }
        self.notify();
    }

    /// Wait until step `ticket` has been serviced. Returns the displayed
    /// timestamp, or `Err(())` on timeout.
    pub(crate) fn wait_step(&self, ticket: u64, timeout: Duration) -> Result<Option<Seconds>, ()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.steps_serviced < ticket {
            let now = Instant::now();
            if now >= deadline || !state.running {
                return Err(());
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(state.last_step)
    }

    pub fn record_frames(&self, displayed: u64, dropped: u64) {
        let mut state = self.lock();
        state.stats.frames_displayed += displayed;
        state.stats.frames_dropped += dropped;
    }

    pub fn set_actual_fps(&self, fps: f64) {
        self.lock().stats.actual_fps = fps;
    }

    pub fn stats(&self) -> PlaybackStats {
        self.lock().stats
    }
}

/// Counts displayed frames over one-second windows
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Count `frames` and return the rate once a window completes
    pub fn tick(&mut self, frames: u32) -> Option<f64> {
        self.frames += frames;
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frames as f64 / elapsed;
        self.frames = 0;
        self.window_start = Instant::now();
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wall_clock_freezes_while_paused() {
        let clock = PlaybackClock::new(false, 1.0);
        thread::sleep(Duration::from_millis(30));
        assert!(clock.lock().toggle_pause());
        let frozen = clock.snapshot().unwrap().position;
        assert!(frozen >= 0.03);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(clock.snapshot().unwrap().position, frozen);
        assert_eq!(clock.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_resume_does_not_jump() {
        let clock = PlaybackClock::new(false, 1.0);
        {
            let mut state = clock.lock();
            state.rebase(3.0);
            state.toggle_pause();
        }
        thread::sleep(Duration::from_millis(50));
        assert!(!clock.lock().toggle_pause());
        let position = clock.snapshot().unwrap().position;
        assert!((3.0..3.03).contains(&position), "position {position}");
    }

    #[test]
    fn test_seek_epoch_guards_stale_updates() {
        let clock = PlaybackClock::new(false, 1.0);
        let before = clock.epoch();
        let during = clock.begin_seek();
        assert_eq!(clock.state(), PlaybackState::Seeking);
        clock.set_current_time_if(before, 9.0);
        assert!(!clock.mark_ended_if(before));

        clock.lock().finish_seek(4.0);
        assert_eq!(clock.current_time(), 4.0);
        assert_eq!(clock.audio_time(), 4.0);
        assert!(clock.mark_ended_if(during));
        assert_eq!(clock.state(), PlaybackState::Ended);
    }

    #[test]
    fn test_step_ticket_roundtrip() {
        let clock = PlaybackClock::new(false, 1.0);
        clock.lock().toggle_pause();
        let ticket = clock.request_step();
        assert!(clock.snapshot().unwrap().step_requested);
        clock.finish_step(Some(1.5));
        assert_eq!(clock.wait_step(ticket, Duration::from_millis(10)), Ok(Some(1.5)));
        assert_eq!(clock.current_time(), 1.5);
        assert!(!clock.snapshot().unwrap().step_requested);
    }

    #[test]
    fn test_volume_is_clamped() {
        let clock = PlaybackClock::new(false, 3.0);
        assert_eq!(clock.volume(), 1.0);
        clock.set_volume(-1.0);
        assert_eq!(clock.volume(), 0.0);
    }

    #[test]
    fn test_shutdown_ends_snapshots() {
        let clock = PlaybackClock::new(true, 1.0);
        clock.shutdown();
        assert!(clock.snapshot().is_none());
        // returns immediately once shut down
        clock.wait(Duration::from_secs(10));
    }
}
