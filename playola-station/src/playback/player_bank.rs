//! Fixed pool of player slots
//!
//! A slot is bound to at most one file key at a time. Acquisition and release
//! happen only on the station's event loop, so the table needs no locking.

use std::collections::HashMap;

/// Default number of concurrently bound players
pub const DEFAULT_PLAYER_BANK_SIZE: usize = 10;

#[derive(Debug)]
pub struct PlayerBank {
    slots: Vec<Option<String>>,
    by_key: HashMap<String, usize>,
}

impl PlayerBank {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            by_key: HashMap::new(),
        }
    }

    /// Bind `key` to a free slot
    ///
    /// Returns the slot already bound to `key` if there is one, or `None`
    /// when every slot is taken.
    pub fn acquire(&mut self, key: &str) -> Option<usize> {
        if let Some(&slot) = self.by_key.get(key) {
            return Some(slot);
        }
        let slot = self.slots.iter().position(Option::is_none)?;
        self.slots[slot] = Some(key.to_string());
        self.by_key.insert(key.to_string(), slot);
        Some(slot)
    }

    /// Unbind `key`; returns the slot it held
    pub fn release(&mut self, key: &str) -> Option<usize> {
        let slot = self.by_key.remove(key)?;
        self.slots[slot] = None;
        Some(slot)
    }

    pub fn slot_for(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn key_at(&self, slot: usize) -> Option<&str> {
        self.slots.get(slot)?.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Unbind everything; returns the slots that were bound
    pub fn release_all(&mut self) -> Vec<usize> {
        let bound: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.as_ref().map(|_| idx))
            .collect();
        self.slots.iter_mut().for_each(|s| *s = None);
        self.by_key.clear();
        bound
    }
}

impl Default for PlayerBank {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_BANK_SIZE)
    }
}
