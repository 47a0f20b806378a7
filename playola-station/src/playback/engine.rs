//! Playback engine
//!
//! **Responsibilities:**
//! - Bind queued files to player-bank slots and start them at their airtime
//! - Join late: a file whose start time has passed starts at the matching offset
//! - Fade the outgoing file out in steps, then free its slot
//! - Keep every start and fade as an entry in one [`TimerQueue`]
//!
//! The engine never sleeps. Its owner (the station service loop) waits for
//! [`PlaybackEngine::next_deadline`] and calls [`PlaybackEngine::fire_due`].
//! Wall-clock times are converted to monotonic deadlines through the
//! [`DateHandler`] each time timers are (re)derived.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use playola_common::events::{EventBus, StationEvent};
use playola_common::time::DateHandler;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::fader::{Fader, FADE_STEP_INTERVAL};
use super::player_bank::PlayerBank;
use super::queue::{queue_key, ItemPhase, PlaybackQueue, QueuedItem, TrackMetadata};
use crate::audio::AudioBackend;
use crate::error::{Error, Result};
use crate::timer::{deadline_for, TimerQueue};

/// Engine callbacks held in the timer queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineTimer {
    Start { key: String },
    FadeBegin { key: String },
    FadeStep { key: String },
}

impl EngineTimer {
    pub fn key(&self) -> &str {
        match self {
            EngineTimer::Start { key } | EngineTimer::FadeBegin { key } | EngineTimer::FadeStep { key } => key,
        }
    }
}

/// Result of [`PlaybackEngine::load_audio`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was already in the queue; nothing changed
    AlreadyQueued,
    /// Start time is in the future; a start timer is set
    Scheduled,
    /// Start time had passed; playback began at this offset into the file
    StartedAt(Duration),
}

pub struct PlaybackEngine {
    backend: Box<dyn AudioBackend>,
    clock: Arc<dyn DateHandler>,
    events: EventBus,
    bank: PlayerBank,
    queue: PlaybackQueue,
    timers: TimerQueue<EngineTimer>,
    fader: Fader,
    now_playing: Option<String>,
}

impl PlaybackEngine {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        clock: Arc<dyn DateHandler>,
        events: EventBus,
        bank_size: usize,
        fader: Fader,
    ) -> Self {
        info!(
            "Playback engine: {} player slots, {:?} {} crossfade",
            bank_size,
            fader.duration(),
            fader.curve()
        );
        Self {
            backend,
            clock,
            events,
            bank: PlayerBank::new(bank_size),
            queue: PlaybackQueue::new(),
            timers: TimerQueue::new(),
            fader,
            now_playing: None,
        }
    }

    /// Queue `path` to start at `start` and fade out from `fade_start`
    ///
    /// Enqueueing a file that is already queued is a no-op. A start time in
    /// the past begins playback immediately, `now - start` into the file,
    /// clamped to the end of the crossfade window.
    pub fn load_audio(
        &mut self,
        path: &Path,
        start: DateTime<Utc>,
        fade_start: DateTime<Utc>,
        metadata: TrackMetadata,
    ) -> Result<LoadOutcome> {
        let key = queue_key(path);
        if self.queue.contains(&key) {
            debug!("{} already queued", key);
            return Ok(LoadOutcome::AlreadyQueued);
        }

        let slot = match self.bank.acquire(&key) {
            Some(slot) => slot,
            None => {
                warn!("No free player slot for {} ({} in use)", key, self.bank.capacity());
                return Err(Error::NoSlotAvailable(key));
            }
        };

        match self.backend.load(slot, path) {
            Ok(info) => debug!(
                "Slot {} loaded {} (duration {:?}, {} Hz)",
                slot, key, info.duration, info.sample_rate
            ),
            Err(e) => {
                warn!("Failed to load {}: {}", key, e);
                self.bank.release(&key);
                return Err(e);
            }
        }

        self.queue.insert(QueuedItem {
            key: key.clone(),
            path: path.to_path_buf(),
            slot,
            start,
            fade_start,
            metadata,
            phase: ItemPhase::Pending,
        });

        match self.late_offset(start, fade_start) {
            Some(offset) => {
                self.start_item(&key, offset)?;
                self.schedule_item_timers(&key);
                Ok(LoadOutcome::StartedAt(offset))
            }
            None => {
                self.schedule_item_timers(&key);
                debug!("{} scheduled for {}", key, start);
                Ok(LoadOutcome::Scheduled)
            }
        }
    }

    /// Re-derive start and fade timers for every item not already fading
    ///
    /// Idempotent; the station calls it on every tick.
    pub fn refresh_queue_timers(&mut self) {
        let keys: Vec<String> = self
            .queue
            .iter()
            .filter(|item| !item.is_fading())
            .map(|item| item.key.clone())
            .collect();
        for key in keys {
            self.schedule_item_timers(&key);
        }
    }

    /// Move a queued item to new times; false if `key` is not queued
    pub fn reschedule(&mut self, key: &str, start: DateTime<Utc>, fade_start: DateTime<Utc>) -> bool {
        let Some(item) = self.queue.get_mut(key) else {
            return false;
        };
        if item.start == start && item.fade_start == fade_start {
            return true;
        }
        debug!("Rescheduling {}: start {} -> {}", key, item.start, start);
        item.start = start;
        item.fade_start = fade_start;
        self.schedule_item_timers(key);
        true
    }

    /// Release a queued item that has not started; false otherwise
    pub fn cancel_pending(&mut self, key: &str) -> bool {
        if !self.queue.get(key).is_some_and(QueuedItem::is_pending) {
            return false;
        }
        debug!("Cancelling pending {}", key);
        self.release_item(key);
        true
    }

    /// Release every pending item whose key is not in `keep`
    pub fn drop_superseded(&mut self, keep: &HashSet<String>) -> Vec<String> {
        let doomed: Vec<String> = self
            .queue
            .pending_keys()
            .into_iter()
            .filter(|key| !keep.contains(key))
            .collect();
        for key in &doomed {
            debug!("Dropping superseded {}", key);
            self.release_item(key);
        }
        doomed
    }

    /// Halt everything, cancel all timers and free the whole bank
    ///
    /// Emits `StoppedPlaying` only if something was audible.
    pub fn stop(&mut self) -> bool {
        let was_audible = self.queue.iter().any(|item| !item.is_pending());

        for item in self.queue.drain() {
            self.backend.stop(item.slot);
            self.backend.set_volume(item.slot, 1.0);
        }
        self.bank.release_all();
        self.timers.clear();
        self.now_playing = None;

        if was_audible {
            info!("Playback stopped");
            self.events.emit_lossy(StationEvent::StoppedPlaying {
                timestamp: self.clock.now(),
            });
        }
        was_audible
    }

    /// True iff a now-playing item is bound and rendering
    pub fn is_playing(&self) -> bool {
        self.now_playing
            .as_deref()
            .and_then(|key| self.queue.get(key))
            .is_some_and(|item| item.phase == ItemPhase::Playing)
    }

    pub fn now_playing_key(&self) -> Option<&str> {
        self.now_playing.as_deref()
    }

    pub fn now_playing_metadata(&self) -> Option<&TrackMetadata> {
        self.now_playing
            .as_deref()
            .and_then(|key| self.queue.get(key))
            .map(|item| &item.metadata)
    }

    pub fn is_queued(&self, key: &str) -> bool {
        self.queue.contains(key)
    }

    pub fn queued_item(&self, key: &str) -> Option<&QueuedItem> {
        self.queue.get(key)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn free_slots(&self) -> usize {
        self.bank.free_count()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run every engine timer due at `now`; returns how many fired
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let due = self.timers.pop_due(now);
        let fired = due.len();
        for timer in due {
            match timer {
                EngineTimer::Start { key } => self.on_start(&key),
                EngineTimer::FadeBegin { key } => self.on_fade_begin(&key),
                EngineTimer::FadeStep { key } => self.on_fade_step(&key),
            }
        }
        fired
    }

    /// Offset into the file if `start` has already passed
    fn late_offset(&self, start: DateTime<Utc>, fade_start: DateTime<Utc>) -> Option<Duration> {
        let now = self.clock.now();
        let start_local = self.clock.adjusted_date(start);
        if start_local > now {
            return None;
        }
        let late = (now - start_local).to_std().unwrap_or(Duration::ZERO);
        let window_end = (fade_start - start).to_std().unwrap_or(Duration::ZERO) + self.fader.duration();
        Some(late.min(window_end))
    }

    fn deadline_for(&self, when: DateTime<Utc>) -> Instant {
        deadline_for(self.clock.as_ref(), when)
    }

    fn schedule_item_timers(&mut self, key: &str) {
        self.timers.cancel_where(|t| {
            matches!(t, EngineTimer::Start { key: k } | EngineTimer::FadeBegin { key: k } if k == key)
        });

        let Some(item) = self.queue.get(key) else {
            return;
        };
        let (phase, start, fade_start) = (item.phase, item.start, item.fade_start);
        match phase {
            ItemPhase::Pending => {
                let start_at = self.deadline_for(start);
                let fade_at = self.deadline_for(fade_start);
                self.timers.schedule(start_at, EngineTimer::Start { key: key.to_string() });
                self.timers.schedule(fade_at, EngineTimer::FadeBegin { key: key.to_string() });
            }
            ItemPhase::Playing => {
                let fade_at = self.deadline_for(fade_start);
                self.timers.schedule(fade_at, EngineTimer::FadeBegin { key: key.to_string() });
            }
            ItemPhase::Fading { .. } => {}
        }
    }

    fn start_item(&mut self, key: &str, offset: Duration) -> Result<()> {
        let Some(item) = self.queue.get_mut(key) else {
            return Err(Error::InvalidState(format!("{} is not queued", key)));
        };
        let slot = item.slot;
        if let Err(e) = self.backend.play(slot, offset) {
            warn!("Slot {} failed to play {}: {}", slot, key, e);
            self.release_item(key);
            return Err(e);
        }
        item_phase(&mut self.queue, key, ItemPhase::Playing);
        self.now_playing = Some(key.to_string());

        info!("Playing {} from {:?} in slot {}", key, offset, slot);
        self.events.emit_lossy(StationEvent::AudioStarted {
            file: key.to_string(),
            offset_ms: offset.as_millis().min(u64::MAX as u128) as u64,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    fn on_start(&mut self, key: &str) {
        let Some(item) = self.queue.get(key).filter(|item| item.is_pending()) else {
            return;
        };
        let offset = self.late_offset(item.start, item.fade_start).unwrap_or(Duration::ZERO);
        // Errors already released the slot; later items keep their timers
        let _ = self.start_item(key, offset);
    }

    fn on_fade_begin(&mut self, key: &str) {
        let Some(phase) = self.queue.get(key).map(|item| item.phase) else {
            return;
        };
        match phase {
            ItemPhase::Pending => {
                debug!("{} reached its fade before starting, releasing", key);
                self.release_item(key);
            }
            ItemPhase::Playing => {
                debug!("Fading out {}", key);
                item_phase(&mut self.queue, key, ItemPhase::Fading { step: 0 });
                if self.now_playing.as_deref() == Some(key) {
                    self.now_playing = None;
                }
                self.timers.schedule(
                    Instant::now() + FADE_STEP_INTERVAL,
                    EngineTimer::FadeStep { key: key.to_string() },
                );
            }
            ItemPhase::Fading { .. } => {}
        }
    }

    fn on_fade_step(&mut self, key: &str) {
        let Some(item) = self.queue.get_mut(key) else {
            return;
        };
        let ItemPhase::Fading { step } = item.phase else {
            return;
        };
        let step = step + 1;
        item.phase = ItemPhase::Fading { step };
        let slot = item.slot;
        self.backend.set_volume(slot, self.fader.volume_at(step));

        if self.fader.is_finished(step) {
            self.release_item(key);
            debug!("Fade complete for {}", key);
            self.events.emit_lossy(StationEvent::AudioFinished {
                file: key.to_string(),
                timestamp: self.clock.now(),
            });
        } else {
            self.timers.schedule(
                Instant::now() + FADE_STEP_INTERVAL,
                EngineTimer::FadeStep { key: key.to_string() },
            );
        }
    }

    /// Stop the slot, reset its volume, free it and forget the item
    fn release_item(&mut self, key: &str) {
        self.timers.cancel_where(|t| t.key() == key);
        if let Some(item) = self.queue.remove(key) {
            self.backend.stop(item.slot);
            self.backend.set_volume(item.slot, 1.0);
        }
        self.bank.release(key);
        if self.now_playing.as_deref() == Some(key) {
            self.now_playing = None;
        }
    }
}

fn item_phase(queue: &mut PlaybackQueue, key: &str, phase: ItemPhase) {
    if let Some(item) = queue.get_mut(key) {
        item.phase = phase;
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("queued", &self.queue.len())
            .field("free_slots", &self.bank.free_count())
            .field("timers", &self.timers.len())
            .field("now_playing", &self.now_playing)
            .finish()
    }
}
