//! # Playola Common Library
//!
//! Shared code for the Playola station client:
//! - Timeline model (AudioBlock, Spin, Program, User)
//! - Event types and the EventBus
//! - Clock seam (DateHandler)
//! - Remote API contract and HTTP client
//! - Configuration loading
//! - Fade curve definitions

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
