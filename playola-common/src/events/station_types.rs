//! Supporting types carried by station events

use serde::{Deserialize, Serialize};

use crate::model::PlaylistDiff;

/// Station player lifecycle state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum PlayerState {
    /// Nothing loaded
    #[default]
    Idle,
    /// Now-playing file is downloading
    Loading,
    /// Audio handed to the playback engine
    Playing,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "Idle"),
            PlayerState::Loading => write!(f, "Loading"),
            PlayerState::Playing => write!(f, "Playing"),
        }
    }
}

/// What observers must redraw after a playlist change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum PlaylistRefresh {
    /// Structure changed; redraw everything
    FullReload,
    /// Only these positional indexes differ
    Changed { indexes: Vec<usize> },
}

impl From<PlaylistDiff> for PlaylistRefresh {
    fn from(diff: PlaylistDiff) -> Self {
        if diff.full_reload {
            PlaylistRefresh::FullReload
        } else {
            PlaylistRefresh::Changed {
                indexes: diff.changed_indexes,
            }
        }
    }
}
