//! AudioBlock: the audio-bearing unit a spin refers to

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::raw;
use crate::Result;

/// What kind of content an audio block carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioBlockKind {
    #[default]
    Song,
    Commercial,
    CommercialBlock,
    VoiceTrack,
}

impl AudioBlockKind {
    /// Parse the server's `__t` discriminator; unknown values are songs
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "Commercial" => AudioBlockKind::Commercial,
            "CommercialBlock" => AudioBlockKind::CommercialBlock,
            "VoiceTrack" => AudioBlockKind::VoiceTrack,
            _ => AudioBlockKind::Song,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            AudioBlockKind::Song => "Song",
            AudioBlockKind::Commercial => "Commercial",
            AudioBlockKind::CommercialBlock => "CommercialBlock",
            AudioBlockKind::VoiceTrack => "VoiceTrack",
        }
    }
}

/// Audio content referenced by one or more spins
///
/// Offsets (`boo_ms`, `eoi_ms`, `eom_ms`) are milliseconds from the start of
/// the audio. `eom_ms` is where the block logically ends and where the
/// crossfade into the next spin begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioBlock {
    pub id: String,
    pub kind: AudioBlockKind,
    pub duration_ms: u64,
    /// Begin-of-outro
    pub boo_ms: u64,
    /// End-of-intro
    pub eoi_ms: u64,
    /// End-of-message
    pub eom_ms: u64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub audio_file_url: Option<String>,
    pub is_commercial_block: bool,
}

impl AudioBlock {
    /// Build from a raw server dictionary
    ///
    /// `id` and `duration` are required. `eom` falls back to `duration`,
    /// `boo`/`eoi` to zero. Wrongly typed fields are rejected.
    pub fn from_value(raw: &Value) -> Result<Self> {
        const CTX: &str = "audioBlock";
        raw::ensure_object(raw, CTX)?;

        let id = raw::required_str(raw, "id", CTX)?.to_string();
        let duration_ms = raw::required_millis(raw, "duration", CTX)?;
        let eom_ms = raw::optional_millis(raw, "eom", CTX)?.unwrap_or(duration_ms);
        let boo_ms = raw::optional_millis(raw, "boo", CTX)?.unwrap_or(0);
        let eoi_ms = raw::optional_millis(raw, "eoi", CTX)?.unwrap_or(0);

        let kind = raw::optional_str(raw, "__t", CTX)?
            .map(AudioBlockKind::from_type_tag)
            .unwrap_or_default();

        let text = |field: &str| -> Result<String> {
            Ok(raw::optional_str(raw, field, CTX)?
                .unwrap_or_default()
                .to_string())
        };

        Ok(Self {
            id,
            kind,
            duration_ms,
            boo_ms,
            eoi_ms,
            eom_ms,
            title: text("title")?,
            artist: text("artist")?,
            album: text("album")?,
            audio_file_url: raw::optional_str(raw, "audioFileUrl", CTX)?.map(str::to_string),
            is_commercial_block: raw::optional_bool(raw, "isCommercialBlock", CTX)?
                .unwrap_or(kind == AudioBlockKind::CommercialBlock),
        })
    }

    /// Render back to the server's dictionary shape
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "__t": self.kind.type_tag(),
            "duration": self.duration_ms,
            "boo": self.boo_ms,
            "eoi": self.eoi_ms,
            "eom": self.eom_ms,
            "title": self.title,
            "artist": self.artist,
            "album": self.album,
            "audioFileUrl": self.audio_file_url,
            "isCommercialBlock": self.is_commercial_block,
        })
    }

    /// Placeholder block standing in for a commercial break until the
    /// supply fills it
    pub fn commercial_placeholder(id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            kind: AudioBlockKind::CommercialBlock,
            duration_ms,
            boo_ms: 0,
            eoi_ms: 0,
            eom_ms: duration_ms,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            audio_file_url: None,
            is_commercial_block: true,
        }
    }
}
