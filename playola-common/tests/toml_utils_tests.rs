//! Tests for TOML config loading and atomic writes

#[cfg(unix)]
use playola_common::config::check_toml_permissions_loose;
use playola_common::config::{
    load_toml_config, write_toml_config, ApiConfig, LoggingConfig, StationConfig, TomlConfig,
};
use playola_common::FadeCurve;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_config() -> TomlConfig {
    TomlConfig {
        root_folder: Some(PathBuf::from("/srv/playola")),
        logging: LoggingConfig::default(),
        api: ApiConfig {
            auth_token: Some("token-123".to_string()),
            ..ApiConfig::default()
        },
        station: StationConfig {
            fade_curve: FadeCurve::EqualPower,
            locked_seconds_of_preload: 120,
            ..StationConfig::default()
        },
    }
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("station.toml.tmp").exists());
}

#[test]
fn test_atomic_write_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("playola").join("station.toml");

    write_toml_config(&sample_config(), &target).unwrap();
    assert!(target.exists());
}

#[test]
fn test_written_config_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");
    let config = sample_config();

    write_toml_config(&config, &target).unwrap();
    let loaded = load_toml_config(&target).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.station.fade_curve, FadeCurve::EqualPower);
}

#[test]
fn test_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");
    std::fs::write(
        &target,
        r#"
            [station]
            player_bank_size = 4
            fade_curve = "s_curve"
        "#,
    )
    .unwrap();

    let loaded = load_toml_config(&target).unwrap();
    assert_eq!(loaded.station.player_bank_size, 4);
    assert_eq!(loaded.station.fade_curve, FadeCurve::SCurve);
    assert_eq!(loaded.station.prefetch_interval_secs, 10);
    assert_eq!(loaded.logging.level, "info");
    assert!(loaded.root_folder.is_none());
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");
    std::fs::write(&target, "[station]\nprefetch_interval_secs = 0\n").unwrap();

    assert!(load_toml_config(&target).is_err());
}

#[test]
fn test_unparseable_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");
    std::fs::write(&target, "this is = = not toml").unwrap();

    assert!(load_toml_config(&target).is_err());
}

#[test]
#[cfg(unix)]
fn test_atomic_write_sets_permissions_0600() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(!check_toml_permissions_loose(&target).unwrap());
}

#[test]
#[cfg(unix)]
fn test_check_permissions_detects_loose() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("station.toml");

    std::fs::write(&target, "").unwrap();
    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644)).unwrap();
    assert!(check_toml_permissions_loose(&target).unwrap());
}
