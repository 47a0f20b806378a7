//! Commercial-block supply consulted when a program is built

use parking_lot::Mutex;

use super::AudioBlock;

/// Source of audio blocks for commercial-break markers
///
/// Called once per program construction with the number of markers found.
/// Returning fewer blocks than requested leaves the trailing markers with
/// their own placeholder blocks.
pub trait CommercialSupply: Send + Sync {
    fn commercial_blocks(&self, count: usize) -> Vec<AudioBlock>;
}

/// Supply that never fills any marker
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCommercials;

impl CommercialSupply for NoCommercials {
    fn commercial_blocks(&self, _count: usize) -> Vec<AudioBlock> {
        Vec::new()
    }
}

/// Supply that cycles through a fixed rotation
///
/// Successive calls continue where the previous call stopped.
#[derive(Debug)]
pub struct RotatingCommercials {
    rotation: Vec<AudioBlock>,
    cursor: Mutex<usize>,
}

impl RotatingCommercials {
    pub fn new(rotation: Vec<AudioBlock>) -> Self {
        Self {
            rotation,
            cursor: Mutex::new(0),
        }
    }
}

impl CommercialSupply for RotatingCommercials {
    fn commercial_blocks(&self, count: usize) -> Vec<AudioBlock> {
        if self.rotation.is_empty() {
            return Vec::new();
        }
        let mut cursor = self.cursor.lock();
        let blocks = (0..count)
            .map(|i| self.rotation[(*cursor + i) % self.rotation.len()].clone())
            .collect();
        *cursor = (*cursor + count) % self.rotation.len();
        blocks
    }
}
