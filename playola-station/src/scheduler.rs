//! Playlist edits with optimistic apply and rollback
//!
//! A move is applied locally first so observers see the reorder at once,
//! then persisted through the remote API. The server's program replaces the
//! local one on success; on failure the pre-move snapshot comes back.
//!
//! The two halves ([`Scheduler::begin_move`], [`Scheduler::finish_move`])
//! are separate so the station can run the network call off its event loop
//! and feed the result back in. [`Scheduler::move_spin`] chains them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use playola_common::api::{ApiError, RemoteApi};
use playola_common::events::{EventBus, PlaylistRefresh, StationEvent};
use playola_common::model::{diff_playlists, Playlist, PlaylistDiff, Program, Spin, User};
use playola_common::time::DateHandler;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::timeline::Timeline;

/// A move applied locally and awaiting the server
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub user_id: String,
    pub spin_id: String,
    pub from: i64,
    pub to: i64,
    /// Playlist as it was before the optimistic reorder
    pub snapshot: Playlist,
}

pub struct Scheduler {
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn DateHandler>,
    events: EventBus,
    locked_window: ChronoDuration,
}

impl Scheduler {
    /// `locked_window` is the guard band ahead of now in which spins may
    /// not be moved
    pub fn new(
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn DateHandler>,
        events: EventBus,
        locked_window: std::time::Duration,
    ) -> Self {
        Self {
            api,
            clock,
            events,
            locked_window: ChronoDuration::from_std(locked_window).unwrap_or_else(|_| ChronoDuration::zero()),
        }
    }

    /// Index of the first spin that may still be moved
    ///
    /// A spin is changeable once its airtime is later than
    /// `now + locked_window`; a spin whose airtime is being recomputed is
    /// changeable too.
    pub fn first_changeable_index(&self, playlist: &[Spin], now: DateTime<Utc>) -> Option<usize> {
        let earliest = now + self.locked_window;
        playlist.iter().position(|spin| match spin.airtime {
            Some(airtime) => self.clock.adjusted_date(airtime) > earliest,
            None => true,
        })
    }

    /// True iff `position` lies in `[first changeable, last + 1]`
    pub fn playlist_position_is_valid(&self, playlist: &[Spin], position: i64, now: DateTime<Utc>) -> bool {
        let Some(last) = playlist.last() else {
            return false;
        };
        let append = last.playlist_position + 1;
        if position == append {
            return true;
        }
        match self.first_changeable_index(playlist, now) {
            Some(idx) => position >= playlist[idx].playlist_position && position <= append,
            None => false,
        }
    }

    /// Validate and apply a move locally
    ///
    /// Returns `Ok(None)` when the spin is already at `to`. Nothing is
    /// changed when validation fails.
    pub fn begin_move(&self, timeline: &Timeline, spin_id: &str, to: i64) -> Result<Option<PendingMove>> {
        let now = self.clock.now();
        let pending = timeline.with_program(|program| -> Result<Option<PendingMove>> {
            program.advance_on(self.clock.as_ref());
            let snapshot = program.playlist().clone();

            let from = snapshot
                .find(spin_id)
                .map(|spin| spin.playlist_position)
                .ok_or_else(|| Error::SpinNotFound(spin_id.to_string()))?;
            if !self.playlist_position_is_valid(&snapshot, to, now) {
                return Err(Error::InvalidPlaylistPosition(to));
            }
            if from == to {
                return Ok(None);
            }

            let reordered = apply_optimistic_move(&snapshot, from, to);
            program.replace_playlist(Playlist::new(reordered));
            Ok(Some(PendingMove {
                user_id: timeline.user_id().to_string(),
                spin_id: spin_id.to_string(),
                from,
                to,
                snapshot,
            }))
        })?;

        if let Some(pending) = &pending {
            info!("Moving spin {} from {} to {}", pending.spin_id, pending.from, pending.to);
            let diff = timeline.with_program(|program| diff_playlists(&pending.snapshot, program.playlist()));
            self.notify(&pending.user_id, diff);
        }
        Ok(pending)
    }

    /// Settle a move with the server's answer
    ///
    /// Success installs the server's playlist; failure restores the
    /// snapshot and returns the API error. Either way observers get a
    /// refresh.
    pub fn finish_move(
        &self,
        timeline: &Timeline,
        pending: PendingMove,
        result: std::result::Result<User, ApiError>,
    ) -> Result<Playlist> {
        let (outcome, diff) = timeline.with_program(|program| {
            let before = program.playlist().clone();
            let outcome = match result {
                Ok(user) => {
                    let server = without_aired(program, user.program.playlist().clone());
                    program.replace_playlist(server);
                    Ok(())
                }
                Err(e) => {
                    let restored = without_aired(program, pending.snapshot);
                    program.replace_playlist(restored);
                    Err(e)
                }
            };
            program.advance_on(self.clock.as_ref());
            let diff = diff_playlists(&before, program.playlist());
            (outcome.map(|()| program.playlist().clone()), diff)
        });

        match &outcome {
            Ok(_) => debug!("Move of {} confirmed", pending.spin_id),
            Err(e) => warn!("Move of {} failed, restored playlist: {}", pending.spin_id, e),
        }
        self.notify(&pending.user_id, diff);
        outcome.map_err(Error::Api)
    }

    /// Move `spin_id` to playlist position `to` and persist it
    pub async fn move_spin(&self, timeline: &Timeline, spin_id: &str, to: i64) -> Result<Playlist> {
        let Some(pending) = self.begin_move(timeline, spin_id, to)? else {
            return Ok(timeline.playlist());
        };
        let result = self.api.move_spin(&pending.spin_id, pending.to).await;
        self.finish_move(timeline, pending, result)
    }

    fn notify(&self, user_id: &str, diff: PlaylistDiff) {
        if diff.is_empty() {
            return;
        }
        self.events.emit_lossy(StationEvent::PlaylistRefreshed {
            user_id: user_id.to_string(),
            refresh: PlaylistRefresh::from(diff),
            timestamp: self.clock.now(),
        });
    }
}

/// Reorder `playlist` as if the spin at position `from` moved to `to`
///
/// Every spin with a position in `[min, max]` loses its airtime (the server
/// recomputes them). The moved spin is taken from one end of that range and
/// reinserted at the other; positions inside the range are renumbered so the
/// list stays sorted by position.
pub fn apply_optimistic_move(playlist: &[Spin], from: i64, to: i64) -> Vec<Spin> {
    let mut spins = playlist.to_vec();
    let (lo, hi) = (from.min(to), from.max(to));

    let lo_idx = spins.iter().position(|s| s.playlist_position >= lo);
    let hi_idx = spins.iter().rposition(|s| s.playlist_position <= hi);
    let (Some(lo_idx), Some(hi_idx)) = (lo_idx, hi_idx) else {
        return spins;
    };
    if lo_idx >= hi_idx {
        return spins;
    }

    let positions: Vec<i64> = spins[lo_idx..=hi_idx].iter().map(|s| s.playlist_position).collect();
    for spin in &mut spins[lo_idx..=hi_idx] {
        spin.airtime = None;
    }

    if from < to {
        let moved = spins.remove(lo_idx);
        spins.insert(hi_idx, moved);
    } else {
        let moved = spins.remove(hi_idx);
        spins.insert(lo_idx, moved);
    }

    for (spin, position) in spins[lo_idx..=hi_idx].iter_mut().zip(positions) {
        spin.playlist_position = position;
    }
    spins
}

/// Drop spins the program has already aired
fn without_aired(program: &Program, playlist: Playlist) -> Playlist {
    let aired: HashSet<&str> = program
        .now_playing()
        .into_iter()
        .chain(program.recently_played().iter())
        .map(|spin| spin.id.as_str())
        .collect();
    if !playlist.iter().any(|spin| aired.contains(spin.id.as_str())) {
        return playlist;
    }
    Playlist::new(
        playlist
            .iter()
            .filter(|spin| !aired.contains(spin.id.as_str()))
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use playola_common::model::{AudioBlock, AudioBlockKind};

    fn spin(id: &str, position: i64, airtime: DateTime<Utc>) -> Spin {
        Spin {
            id: id.to_string(),
            audio_block: AudioBlock {
                id: format!("{}-block", id),
                kind: AudioBlockKind::Song,
                duration_ms: 60_000,
                boo_ms: 0,
                eoi_ms: 0,
                eom_ms: 60_000,
                title: String::new(),
                artist: String::new(),
                album: String::new(),
                audio_file_url: None,
                is_commercial_block: false,
            },
            playlist_position: position,
            airtime: Some(airtime),
            is_commercial_block: false,
        }
    }

    fn lettered() -> Vec<Spin> {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        ["a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .enumerate()
            .map(|(i, id)| spin(id, 11 + i as i64, base + ChronoDuration::minutes(i as i64)))
            .collect()
    }

    fn ids(spins: &[Spin]) -> Vec<&str> {
        spins.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_forward_move() {
        let original = lettered();
        let moved = apply_optimistic_move(&original, 12, 15);

        assert_eq!(ids(&moved), vec!["a", "c", "d", "e", "b", "f", "g"]);
        for idx in 1..=4 {
            assert_eq!(moved[idx].airtime, None, "index {} should be pending", idx);
        }
        for idx in [0, 5, 6] {
            assert_eq!(moved[idx].airtime, original[idx].airtime);
        }
        let positions: Vec<i64> = moved.iter().map(|s| s.playlist_position).collect();
        assert_eq!(positions, (11..=17).collect::<Vec<_>>());
    }

    #[test]
    fn test_backward_move() {
        let moved = apply_optimistic_move(&lettered(), 15, 12);
        assert_eq!(ids(&moved), vec!["a", "e", "b", "c", "d", "f", "g"]);
        assert_eq!(moved[1].playlist_position, 12);
        assert_eq!(moved[4].playlist_position, 15);
    }

    #[test]
    fn test_move_to_append_slot() {
        let moved = apply_optimistic_move(&lettered(), 15, 18);
        assert_eq!(ids(&moved), vec!["a", "b", "c", "d", "f", "g", "e"]);
        assert!(moved[4..].iter().all(|s| s.airtime.is_none()));
    }

    #[test]
    fn test_out_of_range_move_is_unchanged() {
        let original = lettered();
        let moved = apply_optimistic_move(&original, 40, 50);
        assert_eq!(moved, original);
    }
}
