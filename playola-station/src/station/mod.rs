//! Station orchestration
//!
//! [`StationService`] owns the [`StationPlayer`] on a single tokio task;
//! everything else talks to it through a [`StationHandle`].

mod messages;
mod player;
mod service;
mod window;

pub use messages::{StationCommand, StationTimer};
pub use player::StationPlayer;
pub use service::{StationHandle, StationService};
pub use window::prefetch_window;

use std::sync::Arc;

use playola_common::api::RemoteApi;
use playola_common::events::{EventBus, PlayerState};
use playola_common::model::Spin;
use playola_common::time::DateHandler;
use serde::Serialize;

use crate::audio::AudioBackend;
use crate::cache::RemoteFileCache;

/// Collaborators injected into the station
pub struct StationDeps {
    pub api: Arc<dyn RemoteApi>,
    pub cache: RemoteFileCache,
    pub clock: Arc<dyn DateHandler>,
    pub backend: Box<dyn AudioBackend>,
    pub events: EventBus,
}

/// Point-in-time view of the station
#[derive(Debug, Clone, Serialize)]
pub struct StationStatus {
    pub state: PlayerState,
    pub user_id: Option<String>,
    pub now_playing: Option<Spin>,
    /// The engine is rendering an airing file
    pub engine_playing: bool,
    /// Files held by the engine, pending, playing or fading
    pub queued: usize,
}
