//! Spin: one scheduled airing of an audio block

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::raw;
use super::AudioBlock;
use crate::time::millis;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spin {
    pub id: String,
    pub audio_block: AudioBlock,
    pub playlist_position: i64,
    /// Scheduled start; `None` while the server is recomputing it
    pub airtime: Option<DateTime<Utc>>,
    pub is_commercial_block: bool,
}

impl Spin {
    pub fn from_value(raw: &Value) -> Result<Self> {
        const CTX: &str = "spin";
        raw::ensure_object(raw, CTX)?;

        let id = raw::required_str(raw, "id", CTX)?.to_string();
        let block_raw = raw.get("audioBlock").filter(|v| !v.is_null()).ok_or_else(|| {
            crate::Error::MalformedPayload(format!("{}: field `audioBlock` is required", CTX))
        })?;
        let audio_block = AudioBlock::from_value(block_raw)?;
        let playlist_position = raw::required_i64(raw, "playlistPosition", CTX)?;
        let airtime = raw::optional_datetime(raw, "airtime", CTX)?;
        let is_commercial_block = raw::optional_bool(raw, "isCommercialBlock", CTX)?
            .unwrap_or(audio_block.is_commercial_block);

        Ok(Self {
            id,
            audio_block,
            playlist_position,
            airtime,
            is_commercial_block,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "audioBlock": self.audio_block.to_value(),
            "playlistPosition": self.playlist_position,
            "airtime": self.airtime.map(|t| t.to_rfc3339()),
            "isCommercialBlock": self.is_commercial_block,
        })
    }

    /// `airtime + eom`, or `None` while the airtime is unresolved or the
    /// sum falls outside chrono's range
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.airtime
            .and_then(|t| t.checked_add_signed(millis(self.audio_block.eom_ms)))
    }

    /// True iff `now` falls in `[airtime, airtime + eom)`
    pub fn is_playing_at(&self, now: DateTime<Utc>) -> bool {
        match (self.airtime, self.end_time()) {
            (Some(start), Some(end)) => start <= now && now < end,
            _ => false,
        }
    }

    pub fn audio_file_url(&self) -> Option<&str> {
        self.audio_block.audio_file_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn raw_spin() -> Value {
        json!({
            "id": "spin-1",
            "playlistPosition": 4,
            "airtime": "2024-05-01T08:00:00Z",
            "endTime": "2024-05-01T08:10:00Z",
            "audioBlock": {
                "id": "ab-1",
                "duration": 200000,
                "eom": 190000,
                "title": "Waterloo"
            }
        })
    }

    #[test]
    fn test_from_value() {
        let spin = Spin::from_value(&raw_spin()).unwrap();
        assert_eq!(spin.id, "spin-1");
        assert_eq!(spin.playlist_position, 4);
        assert_eq!(
            spin.airtime,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(spin.audio_block.title, "Waterloo");
        assert!(!spin.is_commercial_block);
    }

    #[test]
    fn test_end_time_uses_eom_not_server_end_time() {
        let spin = Spin::from_value(&raw_spin()).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 8, 3, 10).unwrap();
        assert_eq!(spin.end_time(), Some(expected));
    }

    #[test]
    fn test_null_airtime() {
        let mut raw = raw_spin();
        raw["airtime"] = Value::Null;
        let spin = Spin::from_value(&raw).unwrap();
        assert!(spin.airtime.is_none());
        assert!(spin.end_time().is_none());
        assert!(!spin.is_playing_at(Utc::now()));
    }

    #[test]
    fn test_is_playing_window_is_half_open() {
        let spin = Spin::from_value(&raw_spin()).unwrap();
        let start = spin.airtime.unwrap();
        let end = spin.end_time().unwrap();

        assert!(!spin.is_playing_at(start - Duration::milliseconds(1)));
        assert!(spin.is_playing_at(start));
        assert!(spin.is_playing_at(end - Duration::milliseconds(1)));
        assert!(!spin.is_playing_at(end));
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let mut raw = raw_spin();
        raw["audioBlock"]["duration"] = json!(9_000_000_000_000_000_000u64);
        raw["audioBlock"].as_object_mut().unwrap().remove("eom");
        assert!(matches!(
            Spin::from_value(&raw),
            Err(crate::Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_end_time_past_chrono_range_is_none() {
        let mut spin = Spin::from_value(&raw_spin()).unwrap();
        spin.audio_block.eom_ms = u64::MAX;
        assert!(spin.end_time().is_none());
        assert!(!spin.is_playing_at(spin.airtime.unwrap()));
    }

    #[test]
    fn test_missing_audio_block_is_rejected() {
        let mut raw = raw_spin();
        raw.as_object_mut().unwrap().remove("audioBlock");
        assert!(Spin::from_value(&raw).is_err());
    }
}
