//! Test helpers for playola-station integration tests
//!
//! - Fakes: transport, audio backend and remote API
//! - Fixtures: spins, users, settings and a wired-up station
//! - Audio generation: real WAV files via hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod fakes;
pub mod fixtures;

use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use playola_station::cache::{CacheError, DownloadHandle};
use tokio::sync::oneshot;

pub use audio_generator::{generate_silent_wav, generate_sine_wav, sine_wav_bytes};
pub use fakes::{BackendCall, FakeApi, FakeTransport, RecordingBackend, SessionCall};
pub use fixtures::*;

/// Wait for a download to finish either way
pub async fn settle(handle: &DownloadHandle) -> Result<PathBuf, CacheError> {
    let (tx, rx) = oneshot::channel();
    let tx = std::sync::Arc::new(Mutex::new(Some(tx)));
    let on_error_tx = tx.clone();
    handle.on_complete(move |path| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(Ok(path.to_path_buf()));
        }
    });
    handle.on_error(move |error| {
        if let Some(tx) = on_error_tx.lock().take() {
            let _ = tx.send(Err(error.clone()));
        }
    });
    tokio::time::timeout(Duration::from_secs(30), rx)
        .await
        .expect("download did not settle")
        .expect("download listeners dropped")
}
