//! Playola Station (playola-station) - Main entry point
//!
//! Tunes into one broadcaster and plays their program until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use playola_common::api::HttpRemoteApi;
use playola_common::config::{LoggingConfig, RootFolderInitializer, RootFolderResolver};
use playola_common::events::{EventBus, StationEvent};
use playola_common::model::NoCommercials;
use playola_common::time::SystemDateHandler;
use playola_station::audio::{AudioBackend, SilentBackend};
use playola_station::cache::{HttpTransport, RemoteFileCache};
use playola_station::config::StationSettings;
use playola_station::{StationDeps, StationService};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "playola-station";
const DEFAULT_LOG_FILTER: &str = "playola_station=debug,playola_common=info";

/// Command-line arguments for playola-station
#[derive(Parser, Debug)]
#[command(name = "playola-station")]
#[command(about = "Plays a Playola broadcaster's program in real time")]
#[command(version)]
struct Args {
    /// Root folder for the audio cache and local state
    #[arg(short, long, env = "PLAYOLA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config_dir>/playola/playola-station.toml)
    #[arg(short, long, env = "PLAYOLA_CONFIG")]
    config: Option<PathBuf>,

    /// Broadcaster to tune into on startup
    #[arg(short, long, env = "PLAYOLA_USER_ID")]
    user_id: Option<String>,

    /// Override the API base URL from the config file
    #[arg(long, env = "PLAYOLA_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Run without an audio device
    #[arg(long, env = "PLAYOLA_SILENT")]
    silent: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_config_file(args.config.clone());
    let mut config = resolver.load_config();
    init_tracing(&config.logging)?;

    if let Some(base_url) = args.api_base_url {
        config.api.base_url = base_url;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting playola-station {} ({}, {} build {})",
        env!("CARGO_PKG_VERSION"),
        playola_station::GIT_HASH,
        playola_station::BUILD_PROFILE,
        playola_station::BUILD_TIMESTAMP
    );

    let root_folder = resolver.resolve_with(&config);
    let initializer = RootFolderInitializer::new(root_folder.clone());
    initializer
        .ensure_directory_exists()
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    initializer
        .ensure_cache_dir(&config.station)
        .context("Failed to create cache directory")?;
    info!("Root folder: {}", root_folder.display());

    let settings = StationSettings::from_toml(root_folder, &config);

    let transport = HttpTransport::new(Duration::from_secs(settings.api.request_timeout_secs))
        .context("Failed to build download client")?;
    let cache = RemoteFileCache::new(
        &settings.cache_dir,
        settings.cache_size_budget_bytes,
        Arc::new(transport),
    )
    .context("Failed to open audio cache")?;
    let api = HttpRemoteApi::from_config(&settings.api, Arc::new(NoCommercials))
        .context("Failed to build API client")?;

    let deps = StationDeps {
        api: Arc::new(api),
        cache,
        clock: Arc::new(SystemDateHandler::new()),
        backend: open_backend(args.silent)?,
        events: EventBus::new(settings.event_bus_capacity),
    };
    let (service, station) = StationService::new(deps, &settings);
    let service_task = service.spawn();

    let mut events = station.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Event logger skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match args.user_id {
        Some(user_id) => station
            .load_user_by_id(&user_id)
            .await
            .with_context(|| format!("Failed to load station {}", user_id))?,
        None => info!("No --user-id given; waiting idle"),
    }

    shutdown_signal().await;
    station.shutdown().await;
    service_task.await.context("Station service panicked")?;
    event_logger.abort();

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let fallback = if logging.level == LoggingConfig::default().level {
        DEFAULT_LOG_FILTER.to_string()
    } else {
        format!("playola_station={0},playola_common={0}", logging.level)
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .context("Invalid log filter")?;

    let file_layer = match &logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(feature = "device")]
fn open_backend(silent: bool) -> Result<Box<dyn AudioBackend>> {
    if silent {
        info!("Silent mode: no audio device");
        return Ok(Box::new(SilentBackend::new()));
    }
    let backend = playola_station::audio::DeviceBackend::open(None).context("Failed to open audio device")?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "device"))]
fn open_backend(silent: bool) -> Result<Box<dyn AudioBackend>> {
    if !silent {
        warn!("Built without the `device` feature; playing silently");
    }
    Ok(Box::new(SilentBackend::new()))
}

fn log_event(event: &StationEvent) {
    match event {
        StationEvent::NowPlayingChanged { spin: Some(spin), .. } => info!(
            "On air: {} - {} ({})",
            spin.audio_block.artist, spin.audio_block.title, spin.id
        ),
        StationEvent::LoadingFailed { user_id, message, .. } => {
            error!("Station {} failed to load: {}", user_id, message)
        }
        StationEvent::LoadingProgress { .. } => {}
        other => debug!("Event: {}", other.event_type()),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
