//! Core types shared by the decoding and playback subsystems.
//!
//! Time is represented in seconds (f64) relative to stream start; the
//! configuration type gathers every tunable of the pipeline.

pub mod config;
pub mod time;

pub use config::{ConfigError, PlayerConfig};
pub use time::{Seconds, ZERO};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if another thread panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
