//! Event types for the Playola station
//!
//! Provides the station event definitions and the EventBus that carries
//! them. Subscriptions are scoped: dropping the receiver unsubscribes.

mod station_types;

pub use station_types::{PlayerState, PlaylistRefresh};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::Spin;

/// Events emitted by the station player and playback engine
///
/// These are the only contract a UI or analytics collaborator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StationEvent {
    /// A different station was selected (or the station was cleared)
    StationChanged {
        user_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Player state machine transition
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
        timestamp: DateTime<Utc>,
    },

    /// Now-playing file download began
    StartedLoading {
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Download progress of the now-playing file
    ///
    /// Only emitted while the spin is still the one the station is waiting
    /// on; progress for a spin the timeline already left is suppressed.
    LoadingProgress {
        user_id: String,
        spin_id: String,
        /// 0.0 ..= 1.0
        fraction: f64,
        timestamp: DateTime<Utc>,
    },

    FinishedLoading {
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Now-playing file could not be fetched; the station is idle again
    LoadingFailed {
        user_id: String,
        spin_id: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },

    StartedPlaying {
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Playback halted; only emitted if something was actually playing
    StoppedPlaying { timestamp: DateTime<Utc> },

    /// Airing spin changed, reflecting every due advance for the instant
    NowPlayingChanged {
        user_id: String,
        spin: Option<Box<Spin>>,
        timestamp: DateTime<Utc>,
    },

    PlaylistRefreshed {
        user_id: String,
        refresh: PlaylistRefresh,
        timestamp: DateTime<Utc>,
    },

    /// Engine started rendering a file
    AudioStarted {
        file: String,
        /// Playback offset into the file (non-zero when joining late)
        offset_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Engine finished the crossfade and released the file's slot
    AudioFinished {
        file: String,
        timestamp: DateTime<Utc>,
    },
}

impl StationEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            StationEvent::StationChanged { .. } => "StationChanged",
            StationEvent::StateChanged { .. } => "StateChanged",
            StationEvent::StartedLoading { .. } => "StartedLoading",
            StationEvent::LoadingProgress { .. } => "LoadingProgress",
            StationEvent::FinishedLoading { .. } => "FinishedLoading",
            StationEvent::LoadingFailed { .. } => "LoadingFailed",
            StationEvent::StartedPlaying { .. } => "StartedPlaying",
            StationEvent::StoppedPlaying { .. } => "StoppedPlaying",
            StationEvent::NowPlayingChanged { .. } => "NowPlayingChanged",
            StationEvent::PlaylistRefreshed { .. } => "PlaylistRefreshed",
            StationEvent::AudioStarted { .. } => "AudioStarted",
            StationEvent::AudioFinished { .. } => "AudioFinished",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event distribution bus over `tokio::sync::broadcast`
///
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use playola_common::events::{EventBus, StationEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(StationEvent::StoppedPlaying {
///     timestamp: chrono::Utc::now(),
/// });
/// assert_eq!(rx.try_recv().unwrap().event_type(), "StoppedPlaying");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per
    /// subscriber before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StationEvent,
    ) -> Result<usize, broadcast::error::SendError<StationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
