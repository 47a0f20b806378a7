//! Network side of the cache
//!
//! A [`Transport`] turns a URL into a stream of body chunks. Production uses
//! [`HttpTransport`] over reqwest; tests substitute a fake.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),
}

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

pub struct TransportResponse {
    /// Total body size, if the server sent one
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `connect_timeout` bounds connection setup only; a transfer may take
    /// as long as it needs
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }

            let content_length = response.content_length();
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError::Network(e.to_string())))
                .boxed();
            Ok(TransportResponse { content_length, body })
        }
        .boxed()
    }
}
