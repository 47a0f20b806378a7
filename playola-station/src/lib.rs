//! # Playola Station Library (playola-station)
//!
//! Playback scheduling and prefetch core for a Playola listener.
//!
//! **Purpose:** Follow a broadcaster's program in wall-clock time: download
//! the airing file and the ones due soon, start each at its airtime (or
//! partway through when joining late), crossfade between them, and keep the
//! playlist editable with optimistic moves.
//!
//! **Architecture:** One event-loop task ([`station::StationService`]) owns
//! the [`station::StationPlayer`], which owns the
//! [`playback::PlaybackEngine`]. Downloads run in the
//! [`cache::RemoteFileCache`]; every timed callback lives in a
//! [`timer::TimerQueue`].

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod playback;
pub mod scheduler;
pub mod station;
pub mod timeline;
pub mod timer;

pub use error::{Error, Result};
pub use station::{StationDeps, StationHandle, StationService, StationStatus};

/// Short git hash of the build
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");
