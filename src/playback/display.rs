//! Display seam for the video loop.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::decode::frame::VideoFrame;

/// Receives each frame the video loop decides to show.
///
/// `present` runs on the video loop thread and must not block.
pub trait DisplaySurface: Send {
    fn present(&mut self, frame: VideoFrame);
}

/// Hands frames to another thread over a bounded channel.
///
/// When the receiver falls behind the newest frame is dropped rather than
/// stalling playback.
#[derive(Debug)]
pub struct ChannelDisplay {
    tx: Sender<VideoFrame>,
    skipped: u64,
}

impl ChannelDisplay {
    pub fn bounded(capacity: usize) -> (Self, Receiver<VideoFrame>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        (Self { tx, skipped: 0 }, rx)
    }

    /// Frames dropped because the receiver was full
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl DisplaySurface for ChannelDisplay {
    fn present(&mut self, frame: VideoFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                self.skipped += 1;
                log::trace!("Display busy, skipping frame at {:.3}s", frame.timestamp);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Discards every frame
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySurface for NullDisplay {
    fn present(&mut self, _frame: VideoFrame) {}
}
