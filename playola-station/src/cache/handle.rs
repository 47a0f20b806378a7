//! Download handles and their listeners
//!
//! A handle is shared by every caller that asked for the same URL while the
//! transfer was in flight. Each listener kind fans out to any number of
//! listeners. Completion and error listeners fire once, after the last
//! progress callback, and are always invoked outside the handle's lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::CacheError;

type ProgressListener = Arc<dyn Fn(f64) + Send + Sync>;
type CompleteListener = Box<dyn FnOnce(&Path) + Send>;
type ErrorListener = Box<dyn FnOnce(&CacheError) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Downloading,
    Paused,
    Complete,
    Failed,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Complete | DownloadState::Failed)
    }
}

struct HandleInner {
    state: DownloadState,
    progress: f64,
    error: Option<CacheError>,
    progress_listeners: Vec<ProgressListener>,
    complete_listeners: Vec<CompleteListener>,
    error_listeners: Vec<ErrorListener>,
}

pub struct DownloadHandle {
    url: String,
    local_path: PathBuf,
    inner: Mutex<HandleInner>,
    paused: watch::Sender<bool>,
}

impl DownloadHandle {
    pub(crate) fn new(url: impl Into<String>, local_path: PathBuf) -> Self {
        Self::with_state(url.into(), local_path, DownloadState::Downloading, 0.0)
    }

    /// Handle for a file that is already on disk
    pub(crate) fn completed(url: impl Into<String>, local_path: PathBuf) -> Self {
        Self::with_state(url.into(), local_path, DownloadState::Complete, 1.0)
    }

    fn with_state(url: String, local_path: PathBuf, state: DownloadState, progress: f64) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            url,
            local_path,
            inner: Mutex::new(HandleInner {
                state,
                progress,
                error: None,
                progress_listeners: Vec::new(),
                complete_listeners: Vec::new(),
                error_listeners: Vec::new(),
            }),
            paused,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Where the file lands once complete
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn state(&self) -> DownloadState {
        self.inner.lock().state
    }

    /// Fraction received, 0.0 ..= 1.0
    pub fn progress(&self) -> f64 {
        self.inner.lock().progress
    }

    pub fn error(&self) -> Option<CacheError> {
        self.inner.lock().error.clone()
    }

    pub fn on_progress(&self, listener: impl Fn(f64) + Send + Sync + 'static) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() {
            inner.progress_listeners.push(Arc::new(listener));
        }
    }

    /// Fires once on completion, immediately if already complete
    pub fn on_complete(&self, listener: impl FnOnce(&Path) + Send + 'static) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            DownloadState::Complete => {
                drop(inner);
                listener(&self.local_path);
            }
            DownloadState::Failed => {}
            DownloadState::Downloading | DownloadState::Paused => {
                inner.complete_listeners.push(Box::new(listener));
            }
        }
    }

    /// Fires once on failure, immediately if already failed
    pub fn on_error(&self, listener: impl FnOnce(&CacheError) + Send + 'static) {
        let mut inner = self.inner.lock();
        let (state, error) = (inner.state, inner.error.clone());
        match (state, error) {
            (DownloadState::Failed, Some(error)) => {
                drop(inner);
                listener(&error);
            }
            (DownloadState::Complete | DownloadState::Failed, _) => {}
            _ => inner.error_listeners.push(Box::new(listener)),
        }
    }

    /// Suspend the transfer; no-op unless downloading
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state == DownloadState::Downloading {
            inner.state = DownloadState::Paused;
            self.paused.send_replace(true);
        }
    }

    /// Continue a paused transfer; no-op unless paused
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.state == DownloadState::Paused {
            inner.state = DownloadState::Downloading;
            self.paused.send_replace(false);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state() == DownloadState::Paused
    }

    pub(crate) fn pause_signal(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    pub(crate) fn report_progress(&self, fraction: f64) {
        let listeners = {
            let mut inner = self.inner.lock();
            inner.progress = fraction.clamp(0.0, 1.0);
            inner.progress_listeners.clone()
        };
        for listener in listeners {
            listener(fraction);
        }
    }

    pub(crate) fn complete(&self) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = DownloadState::Complete;
            inner.progress = 1.0;
            inner.progress_listeners.clear();
            inner.error_listeners.clear();
            std::mem::take(&mut inner.complete_listeners)
        };
        self.paused.send_replace(false);
        for listener in listeners {
            listener(&self.local_path);
        }
    }

    pub(crate) fn fail(&self, error: CacheError) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = DownloadState::Failed;
            inner.error = Some(error.clone());
            inner.progress_listeners.clear();
            inner.complete_listeners.clear();
            std::mem::take(&mut inner.error_listeners)
        };
        self.paused.send_replace(false);
        for listener in listeners {
            listener(&error);
        }
    }
}

impl std::fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DownloadHandle")
            .field("url", &self.url)
            .field("state", &inner.state)
            .field("progress", &inner.progress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handle() -> DownloadHandle {
        DownloadHandle::new("https://cdn.example.com/a.mp3", PathBuf::from("/tmp/a.mp3"))
    }

    #[test]
    fn test_fan_out_completion() {
        let handle = handle();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            handle.on_complete(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        handle.complete();
        handle.complete();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(handle.progress(), 1.0);
    }

    #[test]
    fn test_late_complete_listener_fires_immediately() {
        let handle = DownloadHandle::completed("u", PathBuf::from("/tmp/u"));
        let hit = Arc::new(AtomicUsize::new(0));
        let hit2 = Arc::clone(&hit);
        handle.on_complete(move |path| {
            assert_eq!(path, Path::new("/tmp/u"));
            hit2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_error_listener_fires_immediately() {
        let handle = handle();
        handle.fail(CacheError::Storage("disk full".to_string()));

        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        handle.on_error(move |e| *seen2.lock() = Some(e.clone()));
        assert_eq!(*seen.lock(), Some(CacheError::Storage("disk full".to_string())));

        // Never completes after failing
        let completed = Arc::new(AtomicUsize::new(0));
        let completed2 = Arc::clone(&completed);
        handle.on_complete(move |_| {
            completed2.fetch_add(1, Ordering::SeqCst);
        });
        handle.complete();
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), DownloadState::Failed);
    }

    #[test]
    fn test_pause_resume_transitions() {
        let handle = handle();
        let signal = handle.pause_signal();

        handle.pause();
        handle.pause();
        assert!(handle.is_paused());
        assert!(*signal.borrow());

        handle.resume();
        assert_eq!(handle.state(), DownloadState::Downloading);
        assert!(!*signal.borrow());

        handle.complete();
        handle.pause();
        assert_eq!(handle.state(), DownloadState::Complete, "pause on a complete handle is a no-op");
    }

    #[test]
    fn test_progress_listeners() {
        let handle = handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        handle.on_progress(move |f| seen2.lock().push(f));

        handle.report_progress(0.25);
        handle.report_progress(0.5);
        assert_eq!(*seen.lock(), vec![0.25, 0.5]);
        assert_eq!(handle.progress(), 0.5);
    }
}
