//! What reaches the station's event loop
//!
//! Commands come from [`super::StationHandle`]s. Messages are results of
//! background work (downloads, API calls) marshalled back onto the loop
//! before they touch any state.

use std::path::PathBuf;

use playola_common::api::ApiError;
use playola_common::model::{Playlist, User};
use tokio::sync::oneshot;

use super::StationStatus;
use crate::cache::CacheError;
use crate::error::Result;
use crate::scheduler::PendingMove;

#[derive(Debug)]
pub enum StationCommand {
    LoadUser {
        user: Box<User>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Fetch the user through the remote API, then load them
    LoadUserById {
        user_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    MoveSpin {
        spin_id: String,
        to: i64,
        reply: oneshot::Sender<Result<Playlist>>,
    },
    /// Re-fetch the current user and replace their program
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<StationStatus>,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationTimer {
    PrefetchTick,
    /// Head of the playlist is due to air
    AdvanceCheck,
}

#[derive(Debug)]
pub(crate) enum FetchPurpose {
    Load,
    Refresh { user_id: String },
}

#[derive(Debug)]
pub(crate) enum StationMessage {
    LoadProgress {
        user_id: String,
        spin_id: String,
        url: String,
        fraction: f64,
    },
    LoadComplete {
        user_id: String,
        spin_id: String,
        url: String,
        path: PathBuf,
    },
    LoadFailed {
        user_id: String,
        spin_id: String,
        url: String,
        error: CacheError,
    },
    PrefetchComplete {
        user_id: String,
        spin_id: String,
        url: String,
        path: PathBuf,
    },
    PrefetchFailed {
        user_id: String,
        url: String,
        error: CacheError,
    },
    MoveSettled {
        pending: PendingMove,
        result: std::result::Result<User, ApiError>,
        reply: oneshot::Sender<Result<Playlist>>,
    },
    UserFetched {
        purpose: FetchPurpose,
        result: std::result::Result<User, ApiError>,
        reply: oneshot::Sender<Result<()>>,
    },
}
