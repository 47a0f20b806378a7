//! playola-station runtime settings
//!
//! [`StationSettings`] is the resolved view of a [`TomlConfig`]: durations
//! instead of second counts, a byte budget, and absolute paths.

use std::path::PathBuf;
use std::time::Duration;

use playola_common::config::{ApiConfig, RootFolderInitializer, TomlConfig};
use playola_common::FadeCurve;

use crate::playback::{Fader, DEFAULT_CROSSFADE};

#[derive(Debug, Clone)]
pub struct StationSettings {
    pub root_folder: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_size_budget_bytes: u64,
    /// Prefetch lead time and locked head of the playlist
    pub locked_window: Duration,
    pub prefetch_interval: Duration,
    pub player_bank_size: usize,
    pub crossfade: Duration,
    pub fade_curve: FadeCurve,
    pub event_bus_capacity: usize,
    pub api: ApiConfig,
}

impl StationSettings {
    pub fn from_toml(root_folder: PathBuf, config: &TomlConfig) -> Self {
        let station = &config.station;
        let cache_dir = RootFolderInitializer::new(root_folder.clone()).cache_dir(station);
        Self {
            root_folder,
            cache_dir,
            cache_size_budget_bytes: station.cache_size_budget_mb.saturating_mul(1024 * 1024),
            locked_window: Duration::from_secs(station.locked_seconds_of_preload),
            prefetch_interval: Duration::from_secs(station.prefetch_interval_secs.max(1)),
            player_bank_size: station.player_bank_size.max(1),
            crossfade: if station.crossfade_secs.is_finite() {
                Duration::from_secs_f64(station.crossfade_secs.max(0.0))
            } else {
                DEFAULT_CROSSFADE
            },
            fade_curve: station.fade_curve,
            event_bus_capacity: station.event_bus_capacity,
            api: config.api.clone(),
        }
    }

    pub fn fader(&self) -> Fader {
        Fader::new(self.crossfade, self.fade_curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let root = PathBuf::from("/tmp/playola-test-root");
        let settings = StationSettings::from_toml(root.clone(), &TomlConfig::default());

        assert_eq!(settings.cache_dir, root.join("audio-cache"));
        assert_eq!(settings.cache_size_budget_bytes, 500 * 1024 * 1024);
        assert_eq!(settings.locked_window, Duration::from_secs(360));
        assert_eq!(settings.prefetch_interval, Duration::from_secs(10));
        assert_eq!(settings.player_bank_size, 10);
        assert_eq!(settings.fader().total_steps(), 300);
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let mut config = TomlConfig::default();
        config.station.cache_dir = Some(PathBuf::from("/var/cache/playola"));
        config.station.prefetch_interval_secs = 0;

        let settings = StationSettings::from_toml(PathBuf::from("/tmp/root"), &config);
        assert_eq!(settings.cache_dir, PathBuf::from("/var/cache/playola"));
        assert_eq!(settings.prefetch_interval, Duration::from_secs(1));
    }
}
