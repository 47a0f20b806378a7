//! Items bound to the player bank
//!
//! One entry per queued file, keyed by the file's local path. The playback
//! engine drives each entry through `Pending → Playing → Fading` and removes
//! it once its slot is freed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use playola_common::model::Spin;

/// What the engine knows about the audio it is playing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub spin_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl From<&Spin> for TrackMetadata {
    fn from(spin: &Spin) -> Self {
        Self {
            spin_id: spin.id.clone(),
            title: spin.audio_block.title.clone(),
            artist: spin.audio_block.artist.clone(),
            album: spin.audio_block.album.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    /// Bound to a slot, start time not reached
    Pending,
    Playing,
    /// Volume ramp in progress; `step` counts completed fade steps
    Fading { step: u32 },
}

#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub key: String,
    pub path: PathBuf,
    pub slot: usize,
    pub start: DateTime<Utc>,
    pub fade_start: DateTime<Utc>,
    pub metadata: TrackMetadata,
    pub phase: ItemPhase,
}

impl QueuedItem {
    pub fn is_pending(&self) -> bool {
        self.phase == ItemPhase::Pending
    }

    pub fn is_fading(&self) -> bool {
        matches!(self.phase, ItemPhase::Fading { .. })
    }
}

/// Queue key for a local file
pub fn queue_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: HashMap<String, QueuedItem>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: QueuedItem) {
        self.items.insert(item.key.clone(), item);
    }

    pub fn get(&self, key: &str) -> Option<&QueuedItem> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut QueuedItem> {
        self.items.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<QueuedItem> {
        self.items.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedItem> {
        self.items.values()
    }

    /// Keys of items still waiting for their start time
    pub fn pending_keys(&self) -> Vec<String> {
        self.items
            .values()
            .filter(|item| item.is_pending())
            .map(|item| item.key.clone())
            .collect()
    }

    pub fn drain(&mut self) -> Vec<QueuedItem> {
        self.items.drain().map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
