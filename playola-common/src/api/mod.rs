//! Remote API contract
//!
//! The station consumes four server calls. They are expressed as a trait so
//! the station can be driven by [`http::HttpRemoteApi`] in production and by
//! scripted fakes in tests.

pub mod http;

pub use http::HttpRemoteApi;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::model::User;

/// Errors from the remote API
///
/// Server-side failures are derived from the HTTP status; `Transport` and
/// `Decode` are client-side.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unexpected server response (status {0:?})")]
    Unknown(Option<u16>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Map a non-success HTTP status to the error taxonomy
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 | 403 => ApiError::Unauthorized,
            404 => ApiError::NotFound,
            400 | 422 => ApiError::BadRequest(body.into()),
            other => ApiError::Unknown(Some(other)),
        }
    }
}

/// Server calls the station depends on
pub trait RemoteApi: Send + Sync {
    /// Fetch a user with their program
    fn get_user(&self, user_id: &str) -> BoxFuture<'_, Result<User, ApiError>>;

    /// Persist a spin move; returns the broadcaster with the authoritative
    /// program
    fn move_spin(&self, spin_id: &str, new_position: i64) -> BoxFuture<'_, Result<User, ApiError>>;

    /// Telemetry: a listening session on `broadcaster_id` began
    fn report_listening_session(&self, broadcaster_id: &str) -> BoxFuture<'_, Result<(), ApiError>>;

    /// Telemetry: the current listening session ended
    fn report_end_of_listening_session(&self) -> BoxFuture<'_, Result<(), ApiError>>;
}
