//! Error types for playola-station
//!
//! Module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

use crate::cache::CacheError;
use playola_common::api::ApiError;

/// Main error type for the station crate
#[derive(Error, Debug)]
pub enum Error {
    /// Moved spin id is not in the playlist
    #[error("Spin not found: {0}")]
    SpinNotFound(String),

    /// Target position is outside the changeable window
    #[error("Invalid playlist position: {0}")]
    InvalidPlaylistPosition(i64),

    /// No timeline has been loaded yet
    #[error("Playlist not initialized")]
    PlaylistNotInitialized,

    /// Every player-bank slot is bound
    #[error("No player slot available for {0}")]
    NoSlotAvailable(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Remote API call failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Common(#[from] playola_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The station service task has exited
    #[error("Station service stopped")]
    ServiceStopped,
}

/// Convenience Result type using the station Error
pub type Result<T> = std::result::Result<T, Error>;
