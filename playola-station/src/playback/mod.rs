//! Playback engine and its parts
//!
//! - `player_bank`: fixed pool of slots, one file per slot
//! - `queue`: queued items and their phases
//! - `fader`: stepped fade-out volumes
//! - `engine`: start/fade timers driving the backend

pub mod engine;
pub mod fader;
pub mod player_bank;
pub mod queue;

pub use engine::{EngineTimer, LoadOutcome, PlaybackEngine};
pub use fader::{Fader, DEFAULT_CROSSFADE, FADE_STEPS_PER_SECOND, FADE_STEP_INTERVAL};
pub use player_bank::{PlayerBank, DEFAULT_PLAYER_BANK_SIZE};
pub use queue::{queue_key, ItemPhase, PlaybackQueue, QueuedItem, TrackMetadata};
