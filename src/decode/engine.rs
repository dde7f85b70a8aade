//! Background decoder engine.
//!
//! One producer thread pulls frames from a [`MediaSource`] and pushes them
//! into two timestamp-ordered buffers (video, audio). The producer never runs
//! more than `prefetch_duration` seconds ahead of consumption: it waits on a
//! condition variable that every consume and every seek signals.
//!
//! Lock order is source → video → audio → progress. The producer holds the
//! source lock across "decode one frame + push", and `seek` takes the source
//! lock before clearing the buffers, so a seek can never interleave with an
//! in-flight push.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::lock;
use crate::core::time::Seconds;
use crate::core::PlayerConfig;
use crate::decode::frame::{AudioChunk, AudioFrame, Frame, RawFrame, VideoFrame, VideoImage};
use crate::decode::queue::OrderedFrameQueue;
use crate::decode::source::{DecodeError, MediaSource};
use crate::decode::stream_info::MediaInfo;

/// Slack for comparing timestamps against a seek target
const SEEK_EPSILON: Seconds = 1e-6;

/// Sticky terminal condition of the production loop
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("End of stream")]
    EndOfStream,
    #[error("Decode fault: {0}")]
    DecodeFault(String),
    #[error("Seek fault: {0}")]
    SeekFault(String),
}

impl StreamError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, StreamError::EndOfStream)
    }

    /// Whether production stays parked until the next successful seek
    fn halts_production(&self) -> bool {
        !matches!(self, StreamError::SeekFault(_))
    }
}

/// A consumer found its buffer empty after the bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConsumeError {
    #[error("No more frames")]
    NoMoreFrames,
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub prefetch_duration: Seconds,
    pub consume_timeout: Duration,
    /// Drop audio at the producer when nothing will consume it
    pub decode_audio: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default(), true)
    }
}

impl EngineOptions {
    pub fn from_config(config: &PlayerConfig, decode_audio: bool) -> Self {
        Self {
            prefetch_duration: config.prefetch_duration,
            consume_timeout: config.consume_timeout(),
            decode_audio,
        }
    }
}

/// A timestamp-ordered buffer and its "frame available" signal
struct FrameBuffer<T> {
    queue: Mutex<OrderedFrameQueue<T>>,
    available: Condvar,
}

impl<T> FrameBuffer<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(OrderedFrameQueue::new()),
            available: Condvar::new(),
        }
    }

    fn push(&self, frame: Frame<T>) {
        let mut queue = lock(&self.queue);
        let was_empty = queue.is_empty();
        queue.push(frame);
        if was_empty {
            self.available.notify_all();
        }
    }

    /// Wait up to `timeout` for the buffer to become non-empty
    fn wait_ready(&self, timeout: Duration) -> MutexGuard<'_, OrderedFrameQueue<T>> {
        let deadline = Instant::now() + timeout;
        let mut queue = lock(&self.queue);
        while queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            queue = self
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        queue
    }

    fn len(&self) -> usize {
        lock(&self.queue).len()
    }
}

#[derive(Debug, Default)]
struct Progress {
    max_decoded: Seconds,
    max_consumed: Seconds,
    error: Option<StreamError>,
    /// Frames before this timestamp are discarded after a seek
    seek_floor: Seconds,
    /// First sequence id issued after the latest seek
    seek_mark: u64,
}

struct Shared {
    source: Mutex<Option<Box<dyn MediaSource>>>,
    video: FrameBuffer<VideoImage>,
    audio: FrameBuffer<AudioChunk>,
    progress: Mutex<Progress>,
    /// Signalled on every consume, seek and stop
    consumed: Condvar,
    running: AtomicBool,
    next_sequence: AtomicU64,
    options: EngineOptions,
}

impl Shared {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn wake_producer(&self) {
        let _progress = lock(&self.progress);
        self.consumed.notify_all();
    }

    /// Block while the lookahead window is full or production is halted.
    /// Returns false when the engine is shutting down.
    fn wait_for_capacity(&self) -> bool {
        let mut progress = lock(&self.progress);
        while self.running() {
            let halted = progress.error.as_ref().is_some_and(StreamError::halts_production);
            let delta = progress.max_decoded - progress.max_consumed;
            if !halted && delta < self.options.prefetch_duration {
                return true;
            }
            progress = self.consumed.wait(progress).unwrap_or_else(PoisonError::into_inner);
        }
        false
    }

    /// Decode one frame and store it. The source lock is held throughout.
    fn produce_one(&self) {
        let mut source = lock(&self.source);
        let Some(source) = source.as_mut() else {
            return;
        };
        match source.next_frame() {
            Ok(Some(frame)) => self.store(frame),
            Ok(None) => {
                log::info!("Decoder reached end of stream");
                self.fail(StreamError::EndOfStream);
            }
            Err(e) => {
                log::error!("Decode error: {}", e);
                self.fail(StreamError::DecodeFault(e.to_string()));
            }
        }
    }

    fn store(&self, frame: RawFrame) {
        let floor = lock(&self.progress).seek_floor;
        let timestamp = frame.timestamp();
        match frame {
            RawFrame::Video { timestamp, image } => {
                if timestamp + SEEK_EPSILON < floor {
                    return;
                }
                self.video.push(Frame {
                    timestamp,
                    sequence_id: self.next_sequence.fetch_add(1, Ordering::SeqCst),
                    payload: image.into_rgb24(),
                });
            }
            RawFrame::Audio { timestamp, chunk } => {
                if !self.options.decode_audio || timestamp + chunk.duration() <= floor + SEEK_EPSILON {
                    return;
                }
                self.audio.push(Frame {
                    timestamp,
                    sequence_id: self.next_sequence.fetch_add(1, Ordering::SeqCst),
                    payload: chunk,
                });
            }
        }
        let mut progress = lock(&self.progress);
        progress.max_decoded = progress.max_decoded.max(timestamp);
    }

    /// Record `error`. A decode fault is only cleared by a successful seek,
    /// so a later seek fault does not replace it.
    fn fail(&self, error: StreamError) {
        let mut progress = lock(&self.progress);
        if matches!(progress.error, Some(StreamError::DecodeFault(_))) && matches!(error, StreamError::SeekFault(_)) {
            return;
        }
        progress.error = Some(error);
    }

    fn consume<T>(&self, buffer: &FrameBuffer<T>) -> Result<Frame<T>, ConsumeError> {
        let mut queue = buffer.wait_ready(self.options.consume_timeout);
        let frame = queue.pop().ok_or(ConsumeError::NoMoreFrames)?;
        {
            let mut progress = lock(&self.progress);
            progress.max_consumed = progress.max_consumed.max(frame.timestamp);
            self.consumed.notify_all();
        }
        drop(queue);
        Ok(frame)
    }
}

fn produce(shared: Arc<Shared>) {
    while shared.wait_for_capacity() {
        shared.produce_one();
    }
    log::debug!("Decoder thread exiting");
}

/// Owns the media source and the producer thread
pub struct DecoderEngine {
    shared: Arc<Shared>,
    info: MediaInfo,
    backend: String,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DecoderEngine {
    /// Take ownership of `source` and start decoding in the background
    pub fn start(source: Box<dyn MediaSource>, options: EngineOptions) -> Result<Self, DecodeError> {
        let info = source.info().clone();
        let backend = source.backend().to_string();
        let decode_audio = options.decode_audio && info.has_audio();

        let shared = Arc::new(Shared {
            source: Mutex::new(Some(source)),
            video: FrameBuffer::new(),
            audio: FrameBuffer::new(),
            progress: Mutex::new(Progress::default()),
            consumed: Condvar::new(),
            running: AtomicBool::new(true),
            next_sequence: AtomicU64::new(0),
            options: EngineOptions {
                decode_audio,
                ..options
            },
        });

        let producer = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("avpipe-decoder".to_string())
            .spawn(move || produce(producer))
            .map_err(|e| DecodeError::Thread(e.to_string()))?;

        log::info!(
            "Decoding {}x{} {} @ {:.2} fps via {} (audio: {})",
            info.width,
            info.height,
            info.codec_name,
            info.frame_rate,
            backend,
            decode_audio
        );

        Ok(Self {
            shared,
            info,
            backend,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Pop the next video frame, waiting at most the consume timeout
    pub fn consume_video(&self) -> Result<VideoFrame, ConsumeError> {
        self.shared.consume(&self.shared.video)
    }

    /// Pop the next audio chunk, waiting at most the consume timeout
    pub fn consume_audio(&self) -> Result<AudioFrame, ConsumeError> {
        self.shared.consume(&self.shared.audio)
    }

    /// Reposition decoding at `target` seconds.
    ///
    /// On success both buffers are empty, decoded/consumed marks equal
    /// `target` and any sticky error is cleared. If the source refuses, the
    /// error is recorded as [`StreamError::SeekFault`] and nothing else changes.
    pub fn seek(&self, target: Seconds) -> Result<(), DecodeError> {
        let mut source = lock(&self.shared.source);
        let source = source
            .as_mut()
            .ok_or_else(|| DecodeError::Thread("decoder is stopped".to_string()))?;

        if let Err(e) = source.seek(target) {
            log::warn!("Seek to {:.3}s failed: {}", target, e);
            self.shared.fail(StreamError::SeekFault(e.to_string()));
            return Err(e);
        }

        let mut video = lock(&self.shared.video.queue);
        let mut audio = lock(&self.shared.audio.queue);
        let mut progress = lock(&self.shared.progress);
        video.clear();
        audio.clear();
        progress.max_consumed = target;
        progress.max_decoded = target;
        progress.seek_floor = target;
        progress.seek_mark = self.shared.next_sequence.load(Ordering::SeqCst);
        progress.error = None;
        self.shared.consumed.notify_all();
        log::debug!("Decoder repositioned at {:.3}s", target);
        Ok(())
    }

    /// Stop the producer, join it and release the source. Idempotent.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake_producer();
        if let Some(handle) = lock(&self.thread).take() {
            if handle.join().is_err() {
                log::error!("Decoder thread panicked");
            }
        }
        lock(&self.shared.source).take();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running()
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Name of the active video decode path
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn error(&self) -> Option<StreamError> {
        lock(&self.shared.progress).error.clone()
    }

    pub fn is_end_of_stream(&self) -> bool {
        lock(&self.shared.progress)
            .error
            .as_ref()
            .is_some_and(StreamError::is_end_of_stream)
    }

    pub fn max_timestamp_decoded(&self) -> Seconds {
        lock(&self.shared.progress).max_decoded
    }

    pub fn max_timestamp_consumed(&self) -> Seconds {
        lock(&self.shared.progress).max_consumed
    }

    /// Frames with a sequence id below this mark were decoded before the
    /// latest seek
    pub fn seek_mark(&self) -> u64 {
        lock(&self.shared.progress).seek_mark
    }

    /// Whether `frame` was decoded after the latest seek
    pub fn is_current<T>(&self, frame: &Frame<T>) -> bool {
        frame.sequence_id >= self.seek_mark()
    }

    pub fn buffered_video(&self) -> usize {
        self.shared.video.len()
    }

    pub fn buffered_audio(&self) -> usize {
        self.shared.audio.len()
    }
}

impl Drop for DecoderEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
