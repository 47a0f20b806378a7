//! Streaming a single transfer to disk
//!
//! Chunks go to a file under `partial/`; the file is renamed into the cache
//! directory only after the body ends, so a complete-looking file is always
//! complete.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::handle::DownloadHandle;
use super::transport::Transport;
use super::CacheError;

pub(super) async fn stream_to_disk(
    transport: &dyn Transport,
    handle: &DownloadHandle,
    partial_path: &Path,
) -> Result<u64, CacheError> {
    let mut pause = handle.pause_signal();
    let response = transport.fetch(handle.url()).await?;
    let total = response.content_length.filter(|len| *len > 0);
    let mut body = response.body;

    let mut file = tokio::fs::File::create(partial_path).await?;
    let mut received: u64 = 0;

    loop {
        // Hold position while paused; progress so far stays on disk
        while *pause.borrow_and_update() {
            debug!("Download paused: {}", handle.url());
            if pause.changed().await.is_err() {
                break;
            }
        }

        match body.next().await {
            Some(Ok(chunk)) => {
                file.write_all(&chunk).await?;
                received += chunk.len() as u64;
                let fraction = total.map_or(0.0, |total| (received as f64 / total as f64).min(1.0));
                handle.report_progress(fraction);
            }
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }

    file.flush().await?;
    drop(file);

    if total.is_none() {
        handle.report_progress(1.0);
    }
    tokio::fs::rename(partial_path, handle.local_path()).await?;
    Ok(received)
}
