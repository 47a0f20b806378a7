//! Configuration loading and root folder resolution
//!
//! Each module reads `<config_dir>/playola/<module>.toml`. A missing or
//! unreadable file is never fatal: the module logs a warning and runs on
//! compiled defaults.
//!
//! Root folder priority order:
//! 1. Command-line argument
//! 2. `PLAYOLA_ROOT_FOLDER`, then `PLAYOLA_ROOT`
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fade_curves::FadeCurve;
use crate::{Error, Result};

pub const ROOT_FOLDER_ENV: &str = "PLAYOLA_ROOT_FOLDER";
pub const ROOT_ENV: &str = "PLAYOLA_ROOT";

/// Defaults used when nothing else is configured
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("playola"))
            .unwrap_or_else(|| PathBuf::from("./playola_data"));

        Self {
            root_folder,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is unset
    pub level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token; never logged
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://admin-api.playola.fm".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Station player tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Audio cache size budget
    pub cache_size_budget_mb: u64,
    /// Lead time defining both the prefetch window and the locked
    /// (non-editable) head of the playlist
    pub locked_seconds_of_preload: u64,
    pub prefetch_interval_secs: u64,
    pub player_bank_size: usize,
    pub crossfade_secs: f64,
    pub fade_curve: FadeCurve,
    pub event_bus_capacity: usize,
    /// Defaults to `<root>/audio-cache`
    pub cache_dir: Option<PathBuf>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            cache_size_budget_mb: 500,
            locked_seconds_of_preload: 360,
            prefetch_interval_secs: 10,
            player_bank_size: 10,
            crossfade_secs: 3.0,
            fade_curve: FadeCurve::Linear,
            event_bus_capacity: 1000,
            cache_dir: None,
        }
    }
}

/// Contents of a module's TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub station: StationConfig,
}

impl TomlConfig {
    /// Check values that parse but cannot work
    pub fn validate(&self) -> Result<()> {
        if self.station.player_bank_size == 0 {
            return Err(Error::Config("station.player_bank_size must be at least 1".to_string()));
        }
        if self.station.prefetch_interval_secs == 0 {
            return Err(Error::Config(
                "station.prefetch_interval_secs must be at least 1".to_string(),
            ));
        }
        if !(self.station.crossfade_secs.is_finite() && self.station.crossfade_secs >= 0.0) {
            return Err(Error::Config(
                "station.crossfade_secs must be a non-negative number".to_string(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
///
/// On Unix the file is created with mode 0600 since it may hold the API
/// token.
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = target.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, target) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// True if the file is readable or writable by group or others
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}

/// Resolves the root folder and config file for one module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_override: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_override: None,
        }
    }

    /// Root folder given on the command line (highest priority)
    pub fn with_cli_arg(mut self, root: Option<PathBuf>) -> Self {
        self.cli_arg = root;
        self
    }

    /// Use an explicit config file instead of the per-module default
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_override = path;
        self
    }

    /// `<config_dir>/playola/<module>.toml`, or the explicit override
    pub fn config_file_path(&self) -> Option<PathBuf> {
        self.config_override.clone().or_else(|| {
            dirs::config_dir().map(|d| d.join("playola").join(format!("{}.toml", self.module_name)))
        })
    }

    /// Load the module's TOML config, falling back to defaults
    pub fn load_config(&self) -> TomlConfig {
        let Some(path) = self.config_file_path() else {
            warn!("No config directory on this platform; using defaults");
            return TomlConfig::default();
        };

        if !path.exists() {
            warn!("Config file {} not found; using defaults", path.display());
            return TomlConfig::default();
        }

        match load_toml_config(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                #[cfg(unix)]
                if config.api.auth_token.is_some()
                    && check_toml_permissions_loose(&path).unwrap_or(false)
                {
                    warn!(
                        "Config file {} holds an API token but is readable by others",
                        path.display()
                    );
                }
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                TomlConfig::default()
            }
        }
    }

    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(&self.load_config())
    }

    /// Resolve using an already-loaded config
    pub fn resolve_with(&self, config: &TomlConfig) -> PathBuf {
        if let Some(root) = &self.cli_arg {
            return root.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return PathBuf::from(value);
                }
            }
        }

        if let Some(root) = &config.root_folder {
            return root.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on startup
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Idempotent; creates intermediate directories
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    /// Cache directory for the station: configured path or `<root>/audio-cache`
    pub fn cache_dir(&self, station: &StationConfig) -> PathBuf {
        station
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.root_folder.join("audio-cache"))
    }

    pub fn ensure_cache_dir(&self, station: &StationConfig) -> Result<PathBuf> {
        let dir = self.cache_dir(station);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_defaults() {
        let station = StationConfig::default();
        assert_eq!(station.cache_size_budget_mb, 500);
        assert_eq!(station.locked_seconds_of_preload, 360);
        assert_eq!(station.prefetch_interval_secs, 10);
        assert_eq!(station.player_bank_size, 10);
        assert_eq!(station.fade_curve, FadeCurve::Linear);
    }

    #[test]
    fn test_validate_rejects_empty_bank() {
        let mut config = TomlConfig::default();
        config.station.player_bank_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cache_dir_default_and_override() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/playola"));
        let mut station = StationConfig::default();
        assert_eq!(init.cache_dir(&station), PathBuf::from("/srv/playola/audio-cache"));

        station.cache_dir = Some(PathBuf::from("/mnt/cache"));
        assert_eq!(init.cache_dir(&station), PathBuf::from("/mnt/cache"));
    }
}
