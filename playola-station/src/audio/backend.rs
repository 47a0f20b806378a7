//! Audio backends: where player-bank slots actually render
//!
//! The playback engine decides *when* each slot plays and at what volume;
//! a backend only does what it is told for a given slot index.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::decoder::{AudioDecoder, AudioInfo};
use crate::error::{Error, Result};

/// Per-slot audio rendering
pub trait AudioBackend: Send {
    /// Prepare `path` in `slot`, replacing whatever the slot held
    fn load(&mut self, slot: usize, path: &Path) -> Result<AudioInfo>;

    /// Start rendering the slot's audio `offset` into the file
    fn play(&mut self, slot: usize, offset: Duration) -> Result<()>;

    fn set_volume(&mut self, slot: usize, volume: f32);

    /// Halt the slot and drop its audio
    fn stop(&mut self, slot: usize);
}

#[derive(Debug, Clone)]
struct SilentSlot {
    info: AudioInfo,
    playing: bool,
    volume: f32,
}

/// Headless backend: validates files with symphonia, renders nowhere
///
/// Used with `--silent` and on machines without an audio device.
#[derive(Debug, Default)]
pub struct SilentBackend {
    slots: HashMap<usize, SilentSlot>,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self, slot: usize) -> bool {
        self.slots.get(&slot).is_some_and(|s| s.playing)
    }

    pub fn volume(&self, slot: usize) -> Option<f32> {
        self.slots.get(&slot).map(|s| s.volume)
    }
}

impl AudioBackend for SilentBackend {
    fn load(&mut self, slot: usize, path: &Path) -> Result<AudioInfo> {
        let info = AudioDecoder::probe(path)?;
        debug!("Slot {} loaded {} ({:?})", slot, path.display(), info.duration);
        self.slots.insert(
            slot,
            SilentSlot {
                info,
                playing: false,
                volume: 1.0,
            },
        );
        Ok(info)
    }

    fn play(&mut self, slot: usize, offset: Duration) -> Result<()> {
        let entry = self
            .slots
            .get_mut(&slot)
            .ok_or_else(|| Error::InvalidState(format!("slot {} has nothing loaded", slot)))?;
        if let Some(duration) = entry.info.duration {
            if offset > duration {
                debug!("Slot {} offset {:?} is past the end ({:?})", slot, offset, duration);
            }
        }
        entry.playing = true;
        Ok(())
    }

    fn set_volume(&mut self, slot: usize, volume: f32) {
        if let Some(entry) = self.slots.get_mut(&slot) {
            entry.volume = volume.clamp(0.0, 1.0);
        }
    }

    fn stop(&mut self, slot: usize) {
        self.slots.remove(&slot);
    }
}
