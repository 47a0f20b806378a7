//! Station timeline model
//!
//! Value types built from server payloads. Every constructor validates the
//! fields it needs and returns [`crate::Error::MalformedPayload`] rather
//! than producing a half-populated object.

mod audio_block;
mod commercial;
mod playlist;
mod program;
mod raw;
mod spin;
mod user;

pub use audio_block::{AudioBlock, AudioBlockKind};
pub use commercial::{CommercialSupply, NoCommercials, RotatingCommercials};
pub use playlist::{diff_playlists, Playlist, PlaylistDiff};
pub use program::{Program, RECENTLY_PLAYED_LIMIT};
pub use spin::Spin;
pub use user::User;

#[cfg(test)]
pub(crate) mod test_support {
    use super::{AudioBlock, AudioBlockKind, Spin};
    use chrono::{DateTime, TimeZone, Utc};

    pub fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    pub fn spin_at(id: &str, position: i64, airtime: Option<DateTime<Utc>>) -> Spin {
        Spin {
            id: id.to_string(),
            audio_block: AudioBlock {
                id: format!("{}-block", id),
                kind: AudioBlockKind::Song,
                duration_ms: 60_000,
                boo_ms: 0,
                eoi_ms: 0,
                eom_ms: 60_000,
                title: id.to_string(),
                artist: String::new(),
                album: String::new(),
                audio_file_url: Some(format!("https://cdn.example.com/{}.mp3", id)),
                is_commercial_block: false,
            },
            playlist_position: position,
            airtime,
            is_commercial_block: false,
        }
    }
}
