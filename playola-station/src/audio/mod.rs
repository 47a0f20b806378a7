//! Audio decoding and output backends

pub mod backend;
pub mod decoder;
pub mod mixer;
#[cfg(feature = "device")]
pub mod output;

pub use backend::{AudioBackend, SilentBackend};
pub use decoder::{AudioDecoder, AudioInfo, DecodedAudio};
pub use mixer::Mixer;
#[cfg(feature = "device")]
pub use output::DeviceBackend;
