pub mod buffer;
pub mod sink;

#[cfg(feature = "cpal")]
pub mod player;

pub use buffer::AudioBuffer;
pub use sink::{AudioSink, AudioSinkError, ClockedSink};

#[cfg(feature = "cpal")]
pub use player::CpalSink;
