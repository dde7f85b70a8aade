//! Audio feeding loop.
//!
//! Keeps the sink's queue between the low and high watermarks. Every chunk
//! handed over moves `audio_time` to the chunk's end, which is what the video
//! loop paces against.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::decode::frame::AudioFrame;
use crate::playback::engine::PlaybackEngine;
use crate::playback::state::PlaybackState;

/// Pause between sink level checks while the queue is comfortably full
const REFILL_POLL: Duration = Duration::from_millis(5);

pub(crate) fn run(engine: Arc<PlaybackEngine>) {
    let config = &engine.config;
    let idle = config.idle_wait();
    let mut pending: Option<AudioFrame> = None;

    while let Some(snapshot) = engine.clock.snapshot() {
        if snapshot.state != PlaybackState::Playing {
            engine.clock.wait(idle);
            continue;
        }
        if engine.queued_audio() >= config.audio_low_watermark {
            thread::sleep(REFILL_POLL);
            continue;
        }

        while engine.queued_audio() < config.audio_high_watermark {
            let chunk = match pending.take() {
                Some(chunk) => chunk,
                None => match engine.decoder.consume_audio() {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        // end of stream is handled by the video loop
                        engine.clock.wait(idle);
                        break;
                    }
                },
            };
            if !engine.decoder.is_current(&chunk) {
                continue;
            }
            if !engine.queue_audio(snapshot.epoch, &chunk) {
                pending = Some(chunk);
                break;
            }
        }
    }
    log::debug!("Audio loop exiting");
}
