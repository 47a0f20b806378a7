//! Remote file cache
//!
//! Audio files are downloaded once into a local directory and named after
//! the last path component of their URL. Concurrent requests for the same
//! URL share one transfer. After every finished or failed transfer the
//! directory is pruned back under its size budget, lowest priority and
//! oldest first.
//!
//! The in-flight map and the priority table share one lock that is never
//! held across an await or while a listener runs.

mod download;
mod handle;
mod priority;
mod prune;
mod transport;

pub use handle::{DownloadHandle, DownloadState};
pub use priority::PriorityLevel;
pub use prune::PruneReport;
pub use transport::{ByteStream, HttpTransport, Transport, TransportError, TransportResponse};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sub-directory holding transfers that have not finished
pub const PARTIAL_DIR: &str = "partial";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// URL has no usable last path component
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local filesystem failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Storage(e.to_string())
    }
}

#[derive(Default)]
struct CacheState {
    in_flight: HashMap<String, Arc<DownloadHandle>>,
    priorities: HashMap<String, PriorityLevel>,
}

struct CacheInner {
    directory: PathBuf,
    partial_dir: PathBuf,
    size_budget: u64,
    transport: Arc<dyn Transport>,
    state: Mutex<CacheState>,
}

/// Cheaply cloneable handle to one cache directory
#[derive(Clone)]
pub struct RemoteFileCache {
    inner: Arc<CacheInner>,
}

impl RemoteFileCache {
    /// Open (creating if needed) the cache at `directory`
    ///
    /// Leftover partial files from an earlier run are discarded.
    pub fn new(
        directory: impl Into<PathBuf>,
        size_budget: u64,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CacheError> {
        let directory = directory.into();
        let partial_dir = directory.join(PARTIAL_DIR);

        if partial_dir.exists() {
            std::fs::remove_dir_all(&partial_dir)?;
        }
        std::fs::create_dir_all(&partial_dir)?;

        info!(
            "Audio cache at {} (budget {} bytes)",
            directory.display(),
            size_budget
        );
        Ok(Self {
            inner: Arc::new(CacheInner {
                directory,
                partial_dir,
                size_budget,
                transport,
                state: Mutex::new(CacheState::default()),
            }),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn size_budget(&self) -> u64 {
        self.inner.size_budget
    }

    /// Deterministic local path: the URL's last path component
    pub fn local_path_for(&self, url: &str) -> Result<PathBuf, CacheError> {
        Ok(self.inner.directory.join(file_name_for(url)?))
    }

    /// True if the finished file is on disk, regardless of in-memory state
    pub fn complete_file_exists(&self, url: &str) -> bool {
        self.local_path_for(url).is_ok_and(|path| path.is_file())
    }

    /// Start (or join) the download of `url`
    ///
    /// An in-flight transfer for the same URL is returned (and resumed if
    /// paused) instead of starting a second one. A file already on disk
    /// yields a handle that is complete from the start.
    pub fn download(&self, url: &str) -> Result<Arc<DownloadHandle>, CacheError> {
        let local_path = self.local_path_for(url)?;

        let handle = {
            let mut state = self.inner.state.lock();
            if let Some(existing) = state.in_flight.get(url) {
                debug!("Joining in-flight download of {}", url);
                existing.resume();
                return Ok(Arc::clone(existing));
            }
            if local_path.is_file() {
                debug!("Cache hit for {}", url);
                return Ok(Arc::new(DownloadHandle::completed(url, local_path)));
            }
            let handle = Arc::new(DownloadHandle::new(url, local_path));
            state.in_flight.insert(url.to_string(), Arc::clone(&handle));
            handle
        };

        info!("Downloading {}", url);
        self.spawn_transfer(Arc::clone(&handle));
        Ok(handle)
    }

    fn spawn_transfer(&self, handle: Arc<DownloadHandle>) {
        let cache = self.clone();
        tokio::spawn(async move {
            let partial_path = match handle.local_path().file_name() {
                Some(name) => cache.inner.partial_dir.join(name),
                None => cache.inner.partial_dir.join("download"),
            };
            let transport = Arc::clone(&cache.inner.transport);
            let result = download::stream_to_disk(transport.as_ref(), &handle, &partial_path).await;

            {
                let mut state = cache.inner.state.lock();
                if state
                    .in_flight
                    .get(handle.url())
                    .is_some_and(|h| Arc::ptr_eq(h, &handle))
                {
                    state.in_flight.remove(handle.url());
                }
            }

            match result {
                Ok(bytes) => {
                    info!("Downloaded {} ({} bytes)", handle.url(), bytes);
                    handle.complete();
                }
                Err(e) => {
                    warn!("Download of {} failed: {}", handle.url(), e);
                    if let Err(rm) = tokio::fs::remove_file(&partial_path).await {
                        debug!("No partial file to clean for {}: {}", handle.url(), rm);
                    }
                    handle.fail(e);
                }
            }

            let pruner = cache.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || pruner.prune_to_size_budget()).await {
                warn!("Cache prune after {} did not finish: {}", handle.url(), e);
            }
        });
    }

    pub fn pause_all(&self) {
        for handle in self.in_flight_handles() {
            handle.pause();
        }
    }

    pub fn resume_all(&self) {
        for handle in self.in_flight_handles() {
            handle.resume();
        }
    }

    /// Handle of the in-flight transfer for `url`, if any
    pub fn in_flight(&self, url: &str) -> Option<Arc<DownloadHandle>> {
        self.inner.state.lock().in_flight.get(url).cloned()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    fn in_flight_handles(&self) -> Vec<Arc<DownloadHandle>> {
        self.inner.state.lock().in_flight.values().cloned().collect()
    }

    /// Replace the whole priority table; URLs not listed are `Unspecified`
    pub fn set_priorities(&self, priorities: HashMap<String, PriorityLevel>) {
        debug!("Cache priority table now has {} entries", priorities.len());
        self.inner.state.lock().priorities = priorities;
    }

    pub fn priority_of(&self, url: &str) -> PriorityLevel {
        self.inner
            .state
            .lock()
            .priorities
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    /// Delete files until the directory fits the size budget
    ///
    /// `DoNotDelete` files are skipped; a file that cannot be deleted is
    /// logged and skipped.
    pub fn prune_to_size_budget(&self) -> PruneReport {
        // Priorities are keyed by URL; prune sees file names
        let by_file: HashMap<String, PriorityLevel> = {
            let state = self.inner.state.lock();
            state
                .priorities
                .iter()
                .filter_map(|(url, level)| file_name_for(url).ok().map(|name| (name, *level)))
                .fold(HashMap::new(), |mut acc, (name, level)| {
                    let slot = acc.entry(name).or_insert(level);
                    *slot = (*slot).max(level);
                    acc
                })
        };

        prune::prune_directory(&self.inner.directory, self.inner.size_budget, |path| {
            path.file_name()
                .and_then(|name| by_file.get(&*name.to_string_lossy()))
                .copied()
                .unwrap_or_default()
        })
    }

    /// Total size of completed files
    pub fn directory_size(&self) -> u64 {
        prune::directory_size(&self.inner.directory)
    }

    pub fn cached_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = prune::list_files(&self.inner.directory)
            .into_iter()
            .map(|(path, _, _)| path)
            .collect();
        files.sort();
        files
    }
}

impl std::fmt::Debug for RemoteFileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileCache")
            .field("directory", &self.inner.directory)
            .field("size_budget", &self.inner.size_budget)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

fn file_name_for(url: &str) -> Result<String, CacheError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| CacheError::InvalidUrl(format!("{}: no file name", url)))
}
