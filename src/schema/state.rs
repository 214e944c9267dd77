use serde::{Deserialize, Serialize};

/// Where the playback state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    /// Constructed, no node played yet.
    #[default]
    Init,
    /// Text fully shown, waiting for the player to advance.
    Normal,
    /// Typewriter reveal in progress.
    Typing,
    /// Waiting on a choice or a blocking popup.
    Interacting,
    /// History backlog overlay is open.
    ViewingHistory,
    /// Pause menu overlay is open.
    Paused,
}

impl PlaybackState {
    /// States from which an overlay (history, pause menu) may be opened.
    /// Overlays suspend the reveal and auto-advance and return to the
    /// previous state when closed.
    pub fn accepts_overlay(&self) -> bool {
        matches!(self, Self::Normal | Self::Typing | Self::Interacting)
    }
}
