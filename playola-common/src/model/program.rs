//! Program: a user's now-playing spin plus the queue of future spins
//!
//! The program advances itself: any read of "now playing" first pops every
//! spin whose airtime has passed. Advance is monotonic; a spin that left the
//! playlist never comes back.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{AudioBlock, CommercialSupply, Playlist, Spin};
use crate::time::DateHandler;
use crate::{Error, Result};

/// Maximum length of the recently-played history
pub const RECENTLY_PLAYED_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    now_playing: Option<Spin>,
    playlist: Playlist,
    recently_played: VecDeque<Spin>,
}

impl Program {
    /// Build a program; the playlist is ordered by playlist position
    pub fn new(now_playing: Option<Spin>, playlist: Vec<Spin>) -> Self {
        Self {
            now_playing,
            playlist: Playlist::sorted(playlist),
            recently_played: VecDeque::new(),
        }
    }

    /// Build from the server's program dictionary
    ///
    /// Commercial-block markers (spins flagged `isCommercialBlock`) get
    /// their audio block substituted from `supply`, in playlist order,
    /// with a single call to the supply.
    pub fn from_value(raw: &Value, supply: &dyn CommercialSupply) -> Result<Self> {
        if !raw.is_object() {
            return Err(Error::MalformedPayload(
                "program: expected a JSON object".to_string(),
            ));
        }

        let now_playing = match raw.get("nowPlaying").filter(|v| !v.is_null()) {
            Some(v) => Some(Spin::from_value(v)?),
            None => None,
        };
        let playlist = spin_array(raw, "playlist")?;
        let recently_played: VecDeque<Spin> = spin_array(raw, "recentlyPlayed")?
            .into_iter()
            .take(RECENTLY_PLAYED_LIMIT)
            .collect();

        let mut program = Self {
            recently_played,
            ..Self::new(now_playing, playlist)
        };
        program.inject_commercials(supply);
        Ok(program)
    }

    fn inject_commercials(&mut self, supply: &dyn CommercialSupply) {
        let markers = self.now_playing.iter().filter(|s| s.is_commercial_block).count()
            + self.playlist.iter().filter(|s| s.is_commercial_block).count();
        let mut blocks = supply.commercial_blocks(markers).into_iter();
        if markers == 0 {
            return;
        }
        debug!("Injecting commercials into {} marker spins", markers);

        let mut fill = |spin: &mut Spin| {
            if spin.is_commercial_block {
                if let Some(block) = blocks.next() {
                    spin.audio_block = AudioBlock {
                        is_commercial_block: true,
                        ..block
                    };
                }
            }
        };
        if let Some(spin) = self.now_playing.as_mut() {
            fill(spin);
        }
        self.playlist.make_mut().iter_mut().for_each(fill);
    }

    /// Pop every spin whose airtime is at or before `now`
    ///
    /// Returns whether anything moved. A head spin with no airtime blocks
    /// the advance: its position in time is unknown.
    pub fn advance_if_due(&mut self, now: DateTime<Utc>) -> bool {
        self.advance_while(|airtime| airtime <= now)
    }

    /// Advance against a clock, mapping airtimes through
    /// [`DateHandler::adjusted_date`]
    pub fn advance_on(&mut self, clock: &dyn DateHandler) -> bool {
        let now = clock.now();
        self.advance_while(|airtime| clock.adjusted_date(airtime) <= now)
    }

    fn advance_while(&mut self, due: impl Fn(DateTime<Utc>) -> bool) -> bool {
        let mut changed = false;
        while self
            .playlist
            .first()
            .and_then(|head| head.airtime)
            .is_some_and(&due)
        {
            let next = self.playlist.make_mut().remove(0);
            if let Some(previous) = self.now_playing.replace(next) {
                self.recently_played.push_front(previous);
                self.recently_played.truncate(RECENTLY_PLAYED_LIMIT);
            }
            changed = true;
        }
        changed
    }

    /// Self-correcting read: advance to `now`, then return the airing spin
    pub fn now_playing_at(&mut self, now: DateTime<Utc>) -> Option<&Spin> {
        self.advance_if_due(now);
        self.now_playing.as_ref()
    }

    /// Self-correcting read against a clock
    pub fn now_playing_on(&mut self, clock: &dyn DateHandler) -> Option<&Spin> {
        self.advance_on(clock);
        self.now_playing.as_ref()
    }

    /// Now-playing spin as of the last advance
    pub fn now_playing(&self) -> Option<&Spin> {
        self.now_playing.as_ref()
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Most recent first
    pub fn recently_played(&self) -> &VecDeque<Spin> {
        &self.recently_played
    }

    /// Wholesale replacement after a resync or a confirmed/rejected edit
    pub fn replace_playlist(&mut self, playlist: Playlist) {
        self.playlist = playlist;
    }

    pub fn has_unresolved_airtimes(&self) -> bool {
        self.playlist.has_unresolved_airtimes()
    }

    /// Find a spin by id in now-playing or the upcoming playlist
    pub fn find_spin(&self, spin_id: &str) -> Option<&Spin> {
        self.now_playing
            .as_ref()
            .filter(|s| s.id == spin_id)
            .or_else(|| self.playlist.find(spin_id))
    }
}

fn spin_array(raw: &Value, field: &str) -> Result<Vec<Spin>> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(Spin::from_value).collect(),
        Some(_) => Err(Error::MalformedPayload(format!(
            "program: field `{}` must be an array",
            field
        ))),
    }
}
