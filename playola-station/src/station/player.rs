//! Station player state machine
//!
//! **Responsibilities:**
//! - Load a broadcaster: download the airing file first, everything else waits
//! - Keep the prefetch window downloaded, protected and queued in the engine
//! - Announce airing changes as the program advances
//! - Route playlist edits and resyncs through the [`Scheduler`]
//!
//! Everything here runs on the station's event loop. Downloads and API calls
//! run as background tasks and report back as [`StationMessage`]s; each
//! handler re-checks that the station is still on the same broadcaster
//! before acting on a result.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use playola_common::api::{ApiError, RemoteApi};
use playola_common::events::{EventBus, PlayerState, PlaylistRefresh, StationEvent};
use playola_common::model::{diff_playlists, Playlist, Program, Spin, User};
use playola_common::time::DateHandler;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::messages::{FetchPurpose, StationMessage, StationTimer};
use super::window::prefetch_window;
use super::{StationDeps, StationStatus};
use crate::cache::{CacheError, PriorityLevel, RemoteFileCache};
use crate::config::StationSettings;
use crate::error::{Error, Result};
use crate::playback::{queue_key, PlaybackEngine, TrackMetadata};
use crate::scheduler::{PendingMove, Scheduler};
use crate::timeline::Timeline;
use crate::timer::{deadline_for, TimerQueue};

/// The now-playing download the station is waiting on
#[derive(Debug, Clone)]
struct LoadingTarget {
    user_id: String,
    spin_id: String,
    url: String,
}

pub struct StationPlayer {
    api: Arc<dyn RemoteApi>,
    cache: RemoteFileCache,
    clock: Arc<dyn DateHandler>,
    events: EventBus,
    engine: PlaybackEngine,
    scheduler: Scheduler,
    timers: TimerQueue<StationTimer>,
    inbox: mpsc::UnboundedSender<StationMessage>,
    lead_time: ChronoDuration,
    prefetch_interval: Duration,
    state: PlayerState,
    timeline: Option<Timeline>,
    loading: Option<LoadingTarget>,
    /// URLs with prefetch listeners attached
    requested: HashSet<String>,
    /// Spin id carried by the last NowPlayingChanged
    announced: Option<String>,
    session_open: bool,
}

impl StationPlayer {
    pub(crate) fn new(
        deps: StationDeps,
        settings: &StationSettings,
        inbox: mpsc::UnboundedSender<StationMessage>,
    ) -> Self {
        let StationDeps {
            api,
            cache,
            clock,
            backend,
            events,
        } = deps;

        let engine = PlaybackEngine::new(
            backend,
            clock.clone(),
            events.clone(),
            settings.player_bank_size,
            settings.fader(),
        );
        let scheduler = Scheduler::new(api.clone(), clock.clone(), events.clone(), settings.locked_window);

        Self {
            api,
            cache,
            clock,
            events,
            engine,
            scheduler,
            timers: TimerQueue::new(),
            inbox,
            lead_time: ChronoDuration::from_std(settings.locked_window).unwrap_or_else(|_| ChronoDuration::zero()),
            prefetch_interval: settings.prefetch_interval,
            state: PlayerState::Idle,
            timeline: None,
            loading: None,
            requested: HashSet::new(),
            announced: None,
            session_open: false,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn user_id(&self) -> Option<&str> {
        self.timeline.as_ref().map(|t| t.user_id())
    }

    pub fn status(&self) -> StationStatus {
        StationStatus {
            state: self.state,
            user_id: self.user_id().map(str::to_string),
            now_playing: self
                .timeline
                .as_ref()
                .and_then(|t| t.now_playing_on(self.clock.as_ref())),
            engine_playing: self.engine.is_playing(),
            queued: self.engine.queue_len(),
        }
    }

    /// Switch to `user`'s station and start playing what is airing
    ///
    /// Reloading the broadcaster that is already loaded is a no-op.
    pub fn load_user_and_play(&mut self, user: User) {
        if self.state != PlayerState::Idle && self.user_id() == Some(user.id.as_str()) {
            debug!("Station {} already loaded", user.id);
            return;
        }

        self.halt();
        let user_id = user.id.clone();
        let timeline = Timeline::from_user(&user);
        self.timeline = Some(timeline.clone());
        self.announced = None;

        info!("Loading station {} ({})", user.display_name, user_id);
        self.set_state(PlayerState::Loading);
        self.events.emit_lossy(StationEvent::StationChanged {
            user_id: Some(user_id.clone()),
            timestamp: self.clock.now(),
        });
        self.events.emit_lossy(StationEvent::StartedLoading {
            user_id: user_id.clone(),
            timestamp: self.clock.now(),
        });

        let Some(spin) = timeline.now_playing_on(self.clock.as_ref()) else {
            self.fail_loading(&user_id, None, "nothing is airing".to_string());
            return;
        };
        let Some(url) = spin.audio_file_url().map(str::to_string) else {
            self.fail_loading(&user_id, Some(spin.id.clone()), "airing spin has no audio file".to_string());
            return;
        };

        let window = self.window(&timeline);
        self.protect(&window);
        // The airing file gets the bandwidth
        self.cache.pause_all();

        let handle = match self.cache.download(&url) {
            Ok(handle) => handle,
            Err(e) => {
                self.fail_loading(&user_id, Some(spin.id.clone()), e.to_string());
                return;
            }
        };
        self.loading = Some(LoadingTarget {
            user_id: user_id.clone(),
            spin_id: spin.id.clone(),
            url: url.clone(),
        });

        let tx = self.inbox.clone();
        let (progress_user, progress_spin, progress_url) = (user_id.clone(), spin.id.clone(), url.clone());
        handle.on_progress(move |fraction| {
            let _ = tx.send(StationMessage::LoadProgress {
                user_id: progress_user.clone(),
                spin_id: progress_spin.clone(),
                url: progress_url.clone(),
                fraction,
            });
        });

        let tx = self.inbox.clone();
        let (done_user, done_spin, done_url) = (user_id.clone(), spin.id.clone(), url.clone());
        handle.on_complete(move |path| {
            let _ = tx.send(StationMessage::LoadComplete {
                user_id: done_user,
                spin_id: done_spin,
                url: done_url,
                path: path.to_path_buf(),
            });
        });

        let tx = self.inbox.clone();
        let spin_id = spin.id.clone();
        handle.on_error(move |error| {
            let _ = tx.send(StationMessage::LoadFailed {
                user_id,
                spin_id,
                url,
                error: error.clone(),
            });
        });
    }

    /// Halt playback and forget the broadcaster
    pub fn stop(&mut self) {
        let was_loaded = self.timeline.is_some();
        self.halt();
        self.timeline = None;
        self.announced = None;
        self.set_state(PlayerState::Idle);
        if was_loaded {
            info!("Station stopped");
            self.events.emit_lossy(StationEvent::StationChanged {
                user_id: None,
                timestamp: self.clock.now(),
            });
        }
    }

    /// Start a move; the reply is sent once the server has answered
    pub fn request_move(&mut self, spin_id: String, to: i64, reply: oneshot::Sender<Result<Playlist>>) {
        let Some(timeline) = self.timeline.clone() else {
            let _ = reply.send(Err(Error::PlaylistNotInitialized));
            return;
        };

        match self.scheduler.begin_move(&timeline, &spin_id, to) {
            Err(e) => {
                debug!("Move of {} to {} rejected: {}", spin_id, to, e);
                let _ = reply.send(Err(e));
            }
            Ok(None) => {
                let _ = reply.send(Ok(timeline.playlist()));
            }
            Ok(Some(pending)) => {
                let api = self.api.clone();
                let tx = self.inbox.clone();
                tokio::spawn(async move {
                    let result = api.move_spin(&pending.spin_id, pending.to).await;
                    let _ = tx.send(StationMessage::MoveSettled { pending, result, reply });
                });
            }
        }
    }

    /// Re-fetch the loaded broadcaster and replace the local program
    pub fn request_refresh(&mut self, reply: oneshot::Sender<Result<()>>) {
        let Some(user_id) = self.user_id().map(str::to_string) else {
            let _ = reply.send(Err(Error::PlaylistNotInitialized));
            return;
        };
        self.fetch_user(user_id.clone(), FetchPurpose::Refresh { user_id }, reply);
    }

    /// Fetch a broadcaster through the API, then load them
    pub fn request_load_by_id(&mut self, user_id: String, reply: oneshot::Sender<Result<()>>) {
        self.fetch_user(user_id, FetchPurpose::Load, reply);
    }

    fn fetch_user(&self, user_id: String, purpose: FetchPurpose, reply: oneshot::Sender<Result<()>>) {
        let api = self.api.clone();
        let tx = self.inbox.clone();
        tokio::spawn(async move {
            let result = api.get_user(&user_id).await;
            let _ = tx.send(StationMessage::UserFetched { purpose, result, reply });
        });
    }

    /// Earliest instant at which [`Self::fire_due`] has work
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.engine.next_deadline(), self.timers.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run every engine and station timer due at `now`
    pub fn fire_due(&mut self, now: Instant) {
        let queued = self.engine.queue_len();
        self.engine.fire_due(now);
        if self.engine.queue_len() < queued {
            // A freed file may be wanted again by a later spin
            self.prefetch();
        }
        for timer in self.timers.pop_due(now) {
            match timer {
                StationTimer::PrefetchTick => {
                    self.prefetch();
                    if self.state == PlayerState::Playing {
                        self.timers
                            .schedule(Instant::now() + self.prefetch_interval, StationTimer::PrefetchTick);
                    }
                }
                StationTimer::AdvanceCheck => self.on_advance_check(),
            }
        }
    }

    pub(crate) fn handle_message(&mut self, message: StationMessage) {
        match message {
            StationMessage::LoadProgress {
                user_id,
                spin_id,
                url,
                fraction,
            } => self.on_load_progress(user_id, spin_id, url, fraction),
            StationMessage::LoadComplete {
                user_id,
                spin_id,
                url,
                path,
            } => self.on_load_complete(user_id, spin_id, url, &path),
            StationMessage::LoadFailed {
                user_id,
                spin_id,
                url,
                error,
            } => self.on_load_failed(user_id, spin_id, url, error),
            StationMessage::PrefetchComplete {
                user_id,
                spin_id,
                url,
                path,
            } => self.on_prefetch_complete(user_id, spin_id, url, &path),
            StationMessage::PrefetchFailed { user_id, url, error } => self.on_prefetch_failed(user_id, url, error),
            StationMessage::MoveSettled { pending, result, reply } => self.on_move_settled(pending, result, reply),
            StationMessage::UserFetched { purpose, result, reply } => self.on_user_fetched(purpose, result, reply),
        }
    }

    // ========================================
    // Loading
    // ========================================

    fn is_loading(&self, user_id: &str, url: &str) -> bool {
        self.state == PlayerState::Loading
            && self.user_id() == Some(user_id)
            && self
                .loading
                .as_ref()
                .is_some_and(|target| target.user_id == user_id && target.url == url)
    }

    fn on_load_progress(&mut self, user_id: String, spin_id: String, url: String, fraction: f64) {
        if !self.is_loading(&user_id, &url) {
            return;
        }
        // Progress for a spin that already went off air is noise
        let airing = self
            .timeline
            .as_ref()
            .and_then(|t| t.now_playing_on(self.clock.as_ref()))
            .map(|spin| spin.id);
        if airing.as_deref() != Some(spin_id.as_str()) {
            debug!("Suppressing progress for {}, no longer airing", spin_id);
            return;
        }
        self.events.emit_lossy(StationEvent::LoadingProgress {
            user_id,
            spin_id,
            fraction,
            timestamp: self.clock.now(),
        });
    }

    fn on_load_complete(&mut self, user_id: String, spin_id: String, url: String, path: &Path) {
        if !self.is_loading(&user_id, &url) {
            debug!("Discarding stale download of {} for {}", url, user_id);
            return;
        }
        let Some(timeline) = self.timeline.clone() else {
            return;
        };
        self.loading = None;
        self.cache.resume_all();

        self.set_state(PlayerState::Playing);
        self.events.emit_lossy(StationEvent::FinishedLoading {
            user_id: user_id.clone(),
            timestamp: self.clock.now(),
        });
        self.events.emit_lossy(StationEvent::StartedPlaying {
            user_id: user_id.clone(),
            timestamp: self.clock.now(),
        });
        self.announce_now_playing(&timeline, true);

        match timeline.with_program(|program| program.find_spin(&spin_id).cloned()) {
            Some(spin) => self.queue_spin(&spin, path),
            None => debug!("Spin {} aired while downloading", spin_id),
        }

        self.open_session(&user_id);
        self.timers.schedule(Instant::now(), StationTimer::PrefetchTick);
        self.schedule_advance_check(&timeline);
    }

    fn on_load_failed(&mut self, user_id: String, spin_id: String, url: String, error: CacheError) {
        if !self.is_loading(&user_id, &url) {
            debug!("Ignoring failed download of {} for {}: {}", url, user_id, error);
            return;
        }
        self.fail_loading(&user_id, Some(spin_id), error.to_string());
    }

    fn fail_loading(&mut self, user_id: &str, spin_id: Option<String>, message: String) {
        warn!("Loading station {} failed: {}", user_id, message);
        self.events.emit_lossy(StationEvent::LoadingFailed {
            user_id: user_id.to_string(),
            spin_id,
            message,
            timestamp: self.clock.now(),
        });
        self.halt();
        self.timeline = None;
        self.announced = None;
        self.set_state(PlayerState::Idle);
    }

    // ========================================
    // Prefetch
    // ========================================

    fn window(&self, timeline: &Timeline) -> Vec<Spin> {
        timeline.with_program(|program| {
            program.advance_on(self.clock.as_ref());
            prefetch_window(program, self.clock.as_ref(), self.lead_time)
        })
    }

    /// Mark the window's files undeletable; everything else becomes evictable
    fn protect(&self, window: &[Spin]) {
        let priorities: HashMap<String, PriorityLevel> = window
            .iter()
            .filter_map(|spin| spin.audio_file_url())
            .map(|url| (url.to_string(), PriorityLevel::DoNotDelete))
            .collect();
        self.cache.set_priorities(priorities);
    }

    /// Bring the engine in line with the current prefetch window
    fn prefetch(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        let Some(timeline) = self.timeline.clone() else {
            return;
        };

        let window = self.window(&timeline);
        self.announce_now_playing(&timeline, false);
        self.protect(&window);

        let mut wanted = Vec::with_capacity(window.len());
        for spin in window {
            let Some(url) = spin.audio_file_url().map(str::to_string) else {
                debug!("Spin {} has no audio file, skipping", spin.id);
                continue;
            };
            match self.cache.local_path_for(&url) {
                Ok(path) => wanted.push((spin, url, path)),
                Err(e) => warn!("Cannot cache {}: {}", url, e),
            }
        }

        let keep: HashSet<String> = wanted.iter().map(|(_, _, path)| queue_key(path)).collect();
        let dropped = self.engine.drop_superseded(&keep);
        if !dropped.is_empty() {
            debug!("Dropped {} superseded queue entries", dropped.len());
        }

        // One engine item per file: only the earliest spin using a file may
        // drive it; later repeats wait until that item is released
        let mut claimed: HashSet<&str> = HashSet::new();
        for (spin, url, path) in &wanted {
            let key = queue_key(path);
            if !claimed.insert(url.as_str()) {
                debug!("Spin {} repeats {}, waiting for the earlier airing", spin.id, url);
                continue;
            }
            match self.engine.queued_item(&key).map(|item| item.is_pending()) {
                Some(true) => {
                    if let (Some(start), Some(end)) = (spin.airtime, spin.end_time()) {
                        self.engine.reschedule(&key, start, end);
                    }
                }
                // Audible items keep the times they started with
                Some(false) => {}
                None if self.cache.complete_file_exists(url) => self.queue_spin(spin, path),
                None if !self.requested.contains(url) => self.request_prefetch(timeline.user_id(), spin, url),
                None => {}
            }
        }

        self.engine.refresh_queue_timers();
    }

    fn request_prefetch(&mut self, user_id: &str, spin: &Spin, url: &str) {
        let handle = match self.cache.download(url) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Prefetch of {} refused: {}", url, e);
                return;
            }
        };
        debug!("Prefetching {} for spin {}", url, spin.id);
        self.requested.insert(url.to_string());

        let tx = self.inbox.clone();
        let (done_user, done_spin, done_url) = (user_id.to_string(), spin.id.clone(), url.to_string());
        handle.on_complete(move |path| {
            let _ = tx.send(StationMessage::PrefetchComplete {
                user_id: done_user,
                spin_id: done_spin,
                url: done_url,
                path: path.to_path_buf(),
            });
        });

        let tx = self.inbox.clone();
        let (failed_user, failed_url) = (user_id.to_string(), url.to_string());
        handle.on_error(move |error| {
            let _ = tx.send(StationMessage::PrefetchFailed {
                user_id: failed_user,
                url: failed_url,
                error: error.clone(),
            });
        });
    }

    fn on_prefetch_complete(&mut self, user_id: String, spin_id: String, url: String, path: &Path) {
        self.requested.remove(&url);
        if self.state != PlayerState::Playing || self.user_id() != Some(user_id.as_str()) {
            return;
        }
        let spin = self
            .timeline
            .as_ref()
            .and_then(|t| t.with_program(|program| program.find_spin(&spin_id).cloned()));
        if let Some(spin) = spin {
            self.queue_spin(&spin, path);
        }
    }

    fn on_prefetch_failed(&mut self, user_id: String, url: String, error: CacheError) {
        self.requested.remove(&url);
        if self.user_id() == Some(user_id.as_str()) {
            warn!("Prefetch of {} failed, retrying next tick: {}", url, error);
        }
    }

    /// Hand a downloaded spin to the engine if it has not finished airing
    fn queue_spin(&mut self, spin: &Spin, path: &Path) {
        let (Some(start), Some(end)) = (spin.airtime, spin.end_time()) else {
            debug!("Spin {} has no airtime yet", spin.id);
            return;
        };
        if self.clock.adjusted_date(end) <= self.clock.now() {
            debug!("Spin {} already aired", spin.id);
            return;
        }
        match self.engine.load_audio(path, start, end, TrackMetadata::from(spin)) {
            Ok(outcome) => debug!("Spin {}: {:?}", spin.id, outcome),
            Err(Error::NoSlotAvailable(_)) => {}
            Err(e) => warn!("Could not queue spin {}: {}", spin.id, e),
        }
    }

    // ========================================
    // Airing
    // ========================================

    /// Emit NowPlayingChanged if the airing spin differs from the last one
    /// announced; returns whether it did
    fn announce_now_playing(&mut self, timeline: &Timeline, force: bool) -> bool {
        let spin = timeline.now_playing_on(self.clock.as_ref());
        let id = spin.as_ref().map(|s| s.id.clone());
        if !force && id == self.announced {
            return false;
        }
        if let Some(spin) = &spin {
            info!("Now playing {} ({})", spin.audio_block.title, spin.id);
        }
        self.announced = id;
        self.events.emit_lossy(StationEvent::NowPlayingChanged {
            user_id: timeline.user_id().to_string(),
            spin: spin.map(Box::new),
            timestamp: self.clock.now(),
        });
        true
    }

    fn on_advance_check(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        let Some(timeline) = self.timeline.clone() else {
            return;
        };
        if self.announce_now_playing(&timeline, false) {
            self.prefetch();
        }
        self.schedule_advance_check(&timeline);
    }

    /// Wake when the head of the playlist is due, or after one prefetch
    /// interval if its airtime is unresolved
    fn schedule_advance_check(&mut self, timeline: &Timeline) {
        self.timers.cancel_where(|t| *t == StationTimer::AdvanceCheck);
        let head = timeline.with_program(|program| program.playlist().first().and_then(|spin| spin.airtime));
        let deadline = match head {
            Some(airtime) => deadline_for(self.clock.as_ref(), airtime),
            None => Instant::now() + self.prefetch_interval,
        };
        self.timers.schedule(deadline, StationTimer::AdvanceCheck);
    }

    // ========================================
    // Edits and resync
    // ========================================

    fn on_move_settled(
        &mut self,
        pending: PendingMove,
        result: std::result::Result<User, ApiError>,
        reply: oneshot::Sender<Result<Playlist>>,
    ) {
        let timeline = match &self.timeline {
            Some(timeline) if timeline.user_id() == pending.user_id => timeline.clone(),
            _ => {
                debug!("Station changed before move of {} settled", pending.spin_id);
                let _ = reply.send(Err(Error::InvalidState(
                    "station changed while the move was pending".to_string(),
                )));
                return;
            }
        };

        let outcome = self.scheduler.finish_move(&timeline, pending, result);
        self.after_playlist_change(&timeline);
        let _ = reply.send(outcome);
    }

    fn on_user_fetched(
        &mut self,
        purpose: FetchPurpose,
        result: std::result::Result<User, ApiError>,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let user = match result {
            Ok(user) => user,
            Err(e) => {
                warn!("Fetching broadcaster failed: {}", e);
                let _ = reply.send(Err(Error::Api(e)));
                return;
            }
        };

        match purpose {
            FetchPurpose::Load => {
                self.load_user_and_play(user);
                let _ = reply.send(Ok(()));
            }
            FetchPurpose::Refresh { user_id } => {
                let timeline = match &self.timeline {
                    Some(timeline) if timeline.user_id() == user_id => timeline.clone(),
                    _ => {
                        let _ = reply.send(Err(Error::InvalidState(
                            "station changed while refreshing".to_string(),
                        )));
                        return;
                    }
                };
                self.resync(&timeline, user.program);
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Replace the local program with the server's
    fn resync(&mut self, timeline: &Timeline, program: Program) {
        let before = timeline.playlist();
        timeline.replace_program(program);
        let diff = timeline.with_program(|program| {
            program.advance_on(self.clock.as_ref());
            diff_playlists(&before, program.playlist())
        });
        info!("Resynced station {}", timeline.user_id());
        if !diff.is_empty() {
            self.events.emit_lossy(StationEvent::PlaylistRefreshed {
                user_id: timeline.user_id().to_string(),
                refresh: PlaylistRefresh::from(diff),
                timestamp: self.clock.now(),
            });
        }
        self.after_playlist_change(timeline);
    }

    fn after_playlist_change(&mut self, timeline: &Timeline) {
        if self.state == PlayerState::Playing {
            self.prefetch();
            self.schedule_advance_check(timeline);
        }
    }

    // ========================================
    // Lifecycle
    // ========================================

    fn set_state(&mut self, new_state: PlayerState) {
        if self.state == new_state {
            return;
        }
        let old_state = std::mem::replace(&mut self.state, new_state);
        debug!("Station state {} -> {}", old_state, new_state);
        self.events.emit_lossy(StationEvent::StateChanged {
            old_state,
            new_state,
            timestamp: self.clock.now(),
        });
    }

    /// Stop the engine and drop all in-progress work; keeps the timeline
    fn halt(&mut self) {
        self.engine.stop();
        self.timers.clear();
        self.loading = None;
        self.requested.clear();
        self.cache.resume_all();
        self.close_session();
    }

    fn open_session(&mut self, user_id: &str) {
        self.close_session();
        self.session_open = true;
        let api = self.api.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = api.report_listening_session(&user_id).await {
                debug!("Listening session report failed: {}", e);
            }
        });
    }

    fn close_session(&mut self) {
        if !std::mem::take(&mut self.session_open) {
            return;
        }
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.report_end_of_listening_session().await {
                debug!("End of listening session report failed: {}", e);
            }
        });
    }
}

impl std::fmt::Debug for StationPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationPlayer")
            .field("state", &self.state)
            .field("user_id", &self.user_id())
            .field("loading", &self.loading)
            .field("engine", &self.engine)
            .field("timers", &self.timers.len())
            .finish()
    }
}
