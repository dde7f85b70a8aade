//! Playback state machine.

use std::fmt;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Loops are pacing frames against the reference clock
    Playing,
    /// Position frozen; single steps are still serviced
    Paused,
    /// Transient, while the decoder repositions
    Seeking,
    /// End of stream reached without looping. A seek leaves this state.
    Ended,
}

impl PlaybackState {
    /// Derive the state from the clock flags. Seeking wins over everything,
    /// ended over paused.
    pub fn from_flags(paused: bool, seeking: bool, ended: bool) -> Self {
        if seeking {
            PlaybackState::Seeking
        } else if ended {
            PlaybackState::Ended
        } else if paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused)
    }

    pub fn is_seeking(&self) -> bool {
        matches!(self, PlaybackState::Seeking)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, PlaybackState::Ended)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_precedence() {
        assert_eq!(PlaybackState::from_flags(false, false, false), PlaybackState::Playing);
        assert_eq!(PlaybackState::from_flags(true, false, false), PlaybackState::Paused);
        assert_eq!(PlaybackState::from_flags(true, false, true), PlaybackState::Ended);
        assert_eq!(PlaybackState::from_flags(true, true, true), PlaybackState::Seeking);
    }
}
