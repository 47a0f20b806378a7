//! Playlist snapshots and the positional diff used for minimal refreshes

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Spin;

/// Ordered list of upcoming spins
///
/// Cloning shares the underlying vector, so taking a rollback snapshot is
/// O(1). Mutation goes through [`Playlist::make_mut`] (copy-on-write).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Playlist(Arc<Vec<Spin>>);

impl Playlist {
    pub fn new(spins: Vec<Spin>) -> Self {
        Self(Arc::new(spins))
    }

    /// Build a playlist ordered by ascending playlist position
    pub fn sorted(mut spins: Vec<Spin>) -> Self {
        spins.sort_by_key(|s| s.playlist_position);
        Self::new(spins)
    }

    pub fn spins(&self) -> &[Spin] {
        &self.0
    }

    pub fn make_mut(&mut self) -> &mut Vec<Spin> {
        Arc::make_mut(&mut self.0)
    }

    pub fn into_vec(self) -> Vec<Spin> {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone())
    }

    pub fn find(&self, spin_id: &str) -> Option<&Spin> {
        self.0.iter().find(|s| s.id == spin_id)
    }

    pub fn has_unresolved_airtimes(&self) -> bool {
        self.0.iter().any(|s| s.airtime.is_none())
    }

    /// True when both snapshots share storage (no copy has happened)
    pub fn shares_storage_with(&self, other: &Playlist) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Playlist {
    type Target = [Spin];

    fn deref(&self) -> &[Spin] {
        &self.0
    }
}

impl From<Vec<Spin>> for Playlist {
    fn from(spins: Vec<Spin>) -> Self {
        Self::new(spins)
    }
}

/// Result of comparing two playlists position by position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDiff {
    /// Lengths differ; consumers should redraw everything
    pub full_reload: bool,
    pub changed_indexes: Vec<usize>,
}

impl PlaylistDiff {
    pub fn is_empty(&self) -> bool {
        !self.full_reload && self.changed_indexes.is_empty()
    }
}

fn same_slot(a: &Spin, b: &Spin) -> bool {
    a.id == b.id && a.airtime == b.airtime && a.audio_block.id == b.audio_block.id
}

/// Positional diff: id, airtime and audio block id must all match
pub fn diff_playlists(old: &[Spin], new: &[Spin]) -> PlaylistDiff {
    if old.len() != new.len() {
        return PlaylistDiff {
            full_reload: true,
            changed_indexes: Vec::new(),
        };
    }

    let changed_indexes = old
        .iter()
        .zip(new.iter())
        .enumerate()
        .filter(|(_, (a, b))| !same_slot(a, b))
        .map(|(i, _)| i)
        .collect();

    PlaylistDiff {
        full_reload: false,
        changed_indexes,
    }
}
