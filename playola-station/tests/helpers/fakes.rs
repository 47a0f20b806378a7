//! Substitutes for the network, the audio device and the remote API

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use playola_common::api::{ApiError, RemoteApi};
use playola_common::model::User;
use playola_station::audio::{AudioBackend, AudioInfo};
use playola_station::cache::{Transport, TransportError, TransportResponse};
use playola_station::{Error, Result};
use tokio::sync::watch;

// ========================================
// Transport
// ========================================

/// Serves registered bodies; counts requests; can hold every request at a
/// gate until the test opens it
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, TransportError>>,
    requests: Mutex<Vec<String>>,
    gate: watch::Sender<bool>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_chunking(4096, Duration::ZERO)
    }

    /// Bodies arrive `chunk_size` bytes at a time, `chunk_delay` apart
    pub fn with_chunking(chunk_size: usize, chunk_delay: Duration) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            bodies: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            gate,
            chunk_size: chunk_size.max(1),
            chunk_delay,
        }
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().insert(url.to_string(), body);
    }

    pub fn fail(&self, url: &str, error: TransportError) {
        self.failures.lock().insert(url.to_string(), error);
    }

    /// Hold new and waiting requests until [`Self::open_gate`]
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, url: &str) -> BoxFuture<'static, std::result::Result<TransportResponse, TransportError>> {
        self.requests.lock().push(url.to_string());
        let outcome = match self.failures.lock().get(url) {
            Some(error) => Err(error.clone()),
            None => self
                .bodies
                .lock()
                .get(url)
                .cloned()
                .ok_or(TransportError::Status(404)),
        };
        let mut gate = self.gate.subscribe();
        let (chunk_size, chunk_delay) = (self.chunk_size, self.chunk_delay);

        async move {
            while !*gate.borrow_and_update() {
                if gate.changed().await.is_err() {
                    break;
                }
            }
            let body = outcome?;
            let content_length = Some(body.len() as u64);
            let chunks: Vec<Bytes> = body.chunks(chunk_size).map(Bytes::copy_from_slice).collect();
            let stream = futures::stream::iter(chunks)
                .then(move |chunk| async move {
                    if !chunk_delay.is_zero() {
                        tokio::time::sleep(chunk_delay).await;
                    }
                    Ok(chunk)
                })
                .boxed();
            Ok(TransportResponse {
                content_length,
                body: stream,
            })
        }
        .boxed()
    }
}

// ========================================
// Audio backend
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Load { slot: usize, path: PathBuf },
    Play { slot: usize, offset: Duration },
    Volume { slot: usize, volume: f32 },
    Stop { slot: usize },
}

/// Records every call; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    broken: Arc<Mutex<HashSet<PathBuf>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load` fail for this path
    pub fn break_file(&self, path: &Path) {
        self.broken.lock().insert(path.to_path_buf());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn plays(&self) -> Vec<(usize, Duration)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Play { slot, offset } => Some((*slot, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Load { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn volumes(&self, slot: usize) -> Vec<f32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Volume { slot: s, volume } if *s == slot => Some(*volume),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Stop { slot } => Some(*slot),
                _ => None,
            })
            .collect()
    }
}

impl AudioBackend for RecordingBackend {
    fn load(&mut self, slot: usize, path: &Path) -> Result<AudioInfo> {
        self.calls.lock().push(BackendCall::Load {
            slot,
            path: path.to_path_buf(),
        });
        if self.broken.lock().contains(path) {
            return Err(Error::Decode(format!("unreadable: {}", path.display())));
        }
        Ok(AudioInfo {
            sample_rate: 44_100,
            channels: 2,
            duration: None,
        })
    }

    fn play(&mut self, slot: usize, offset: Duration) -> Result<()> {
        self.calls.lock().push(BackendCall::Play { slot, offset });
        Ok(())
    }

    fn set_volume(&mut self, slot: usize, volume: f32) {
        self.calls.lock().push(BackendCall::Volume { slot, volume });
    }

    fn stop(&mut self, slot: usize) {
        self.calls.lock().push(BackendCall::Stop { slot });
    }
}

// ========================================
// Remote API
// ========================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Started(String),
    Ended,
}

/// Scripted API: users by id, queued move results, optional move gate
pub struct FakeApi {
    users: Mutex<HashMap<String, User>>,
    move_results: Mutex<VecDeque<std::result::Result<User, ApiError>>>,
    move_calls: Mutex<Vec<(String, i64)>>,
    sessions: Mutex<Vec<SessionCall>>,
    move_gate: watch::Sender<bool>,
}

impl FakeApi {
    pub fn new() -> Self {
        let (move_gate, _) = watch::channel(true);
        Self {
            users: Mutex::new(HashMap::new()),
            move_results: Mutex::new(VecDeque::new()),
            move_calls: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            move_gate,
        }
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().insert(user.id.clone(), user);
    }

    pub fn push_move_result(&self, result: std::result::Result<User, ApiError>) {
        self.move_results.lock().push_back(result);
    }

    /// Hold move responses until [`Self::release_moves`]
    pub fn hold_moves(&self) {
        self.move_gate.send_replace(false);
    }

    pub fn release_moves(&self) {
        self.move_gate.send_replace(true);
    }

    pub fn move_calls(&self) -> Vec<(String, i64)> {
        self.move_calls.lock().clone()
    }

    pub fn sessions(&self) -> Vec<SessionCall> {
        self.sessions.lock().clone()
    }
}

impl RemoteApi for FakeApi {
    fn get_user(&self, user_id: &str) -> BoxFuture<'_, std::result::Result<User, ApiError>> {
        let result = self.users.lock().get(user_id).cloned().ok_or(ApiError::NotFound);
        async move { result }.boxed()
    }

    fn move_spin(&self, spin_id: &str, new_position: i64) -> BoxFuture<'_, std::result::Result<User, ApiError>> {
        self.move_calls.lock().push((spin_id.to_string(), new_position));
        let result = self
            .move_results
            .lock()
            .pop_front()
            .unwrap_or(Err(ApiError::Unknown(None)));
        let mut gate = self.move_gate.subscribe();
        async move {
            while !*gate.borrow_and_update() {
                if gate.changed().await.is_err() {
                    break;
                }
            }
            result
        }
        .boxed()
    }

    fn report_listening_session(&self, broadcaster_id: &str) -> BoxFuture<'_, std::result::Result<(), ApiError>> {
        self.sessions.lock().push(SessionCall::Started(broadcaster_id.to_string()));
        async { Ok(()) }.boxed()
    }

    fn report_end_of_listening_session(&self) -> BoxFuture<'_, std::result::Result<(), ApiError>> {
        self.sessions.lock().push(SessionCall::Ended);
        async { Ok(()) }.boxed()
    }
}
