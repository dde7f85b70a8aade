pub mod audio_loop;
pub mod controller;
pub mod display;
pub mod engine;
pub mod state;
pub mod sync;
pub mod video_loop;

pub use controller::PlaybackController;
pub use display::{ChannelDisplay, DisplaySurface, NullDisplay};
pub use engine::ControlError;
pub use state::PlaybackState;
pub use sync::{ClockSnapshot, FpsCounter, PlaybackClock, PlaybackStats};
pub use video_loop::{PaceReport, VideoPacer};
