//! Timeline and station fixtures

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use playola_common::config::TomlConfig;
use playola_common::events::{EventBus, StationEvent};
use playola_common::model::{AudioBlock, AudioBlockKind, Program, Spin, User};
use playola_common::time::DateHandler;
use playola_station::cache::RemoteFileCache;
use playola_station::config::StationSettings;
use playola_station::StationDeps;
use tempfile::TempDir;
use tokio::sync::broadcast;

use super::fakes::{FakeApi, FakeTransport, RecordingBackend};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn audio_url(id: &str) -> String {
    format!("https://cdn.playola.test/audio/{}.wav", id)
}

pub fn spin(id: &str, position: i64, airtime: Option<DateTime<Utc>>, eom_ms: u64) -> Spin {
    Spin {
        id: id.to_string(),
        audio_block: AudioBlock {
            id: format!("{}-block", id),
            kind: AudioBlockKind::Song,
            duration_ms: eom_ms,
            boo_ms: 0,
            eoi_ms: eom_ms,
            eom_ms,
            title: format!("Song {}", id),
            artist: "Test Artist".to_string(),
            album: String::new(),
            audio_file_url: Some(audio_url(id)),
            is_commercial_block: false,
        },
        playlist_position: position,
        airtime,
        is_commercial_block: false,
    }
}

/// `count` back-to-back spins `<prefix>0..`, the first airing at `first_airtime`
pub fn back_to_back(prefix: &str, count: usize, first_airtime: DateTime<Utc>, eom_ms: u64) -> Vec<Spin> {
    (0..count)
        .map(|i| {
            let airtime = first_airtime + ChronoDuration::milliseconds((eom_ms * i as u64) as i64);
            spin(&format!("{}{}", prefix, i), i as i64 + 1, Some(airtime), eom_ms)
        })
        .collect()
}

pub fn user_with(id: &str, playlist: Vec<Spin>) -> User {
    User::new(id, format!("DJ {}", id), Program::new(None, playlist))
}

/// Settings with a 6 minute lead time and short crossfade
pub fn test_settings(cache_dir: &TempDir) -> StationSettings {
    let mut settings = StationSettings::from_toml(cache_dir.path().to_path_buf(), &TomlConfig::default());
    settings.cache_dir = cache_dir.path().to_path_buf();
    settings.crossfade = Duration::from_millis(100);
    settings.prefetch_interval = Duration::from_secs(10);
    settings
}

/// Everything a station test needs, with handles kept for inspection
pub struct StationFixture {
    pub dir: TempDir,
    pub transport: Arc<FakeTransport>,
    pub api: Arc<FakeApi>,
    pub backend: RecordingBackend,
    pub cache: RemoteFileCache,
    pub events: EventBus,
}

impl StationFixture {
    pub fn new(transport: FakeTransport) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let transport = Arc::new(transport);
        let cache = RemoteFileCache::new(dir.path(), 500 * 1024 * 1024, transport.clone()).expect("cache");
        Self {
            dir,
            transport,
            api: Arc::new(FakeApi::new()),
            backend: RecordingBackend::new(),
            cache,
            events: EventBus::new(1000),
        }
    }

    pub fn deps(&self, clock: Arc<dyn DateHandler>) -> StationDeps {
        StationDeps {
            api: self.api.clone(),
            cache: self.cache.clone(),
            clock,
            backend: Box::new(self.backend.clone()),
            events: self.events.clone(),
        }
    }

    pub fn settings(&self) -> StationSettings {
        test_settings(&self.dir)
    }
}

/// Receive events until one satisfies `pred`; panics after `within`
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<StationEvent>,
    within: Duration,
    mut pred: impl FnMut(&StationEvent) -> bool,
) -> StationEvent {
    tokio::time::timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drain what is already buffered
pub fn drain_events(rx: &mut broadcast::Receiver<StationEvent>) -> Vec<StationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
