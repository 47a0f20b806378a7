//! Shared handle to one broadcaster's program
//!
//! Cloning a [`Timeline`] shares the same program. Mutation happens on the
//! station's event loop; the lock is only ever held for the duration of a
//! closure and never across an await.

use std::sync::Arc;

use parking_lot::Mutex;
use playola_common::model::{Playlist, Program, Spin, User};
use playola_common::time::DateHandler;

#[derive(Clone)]
pub struct Timeline {
    user_id: Arc<str>,
    program: Arc<Mutex<Program>>,
}

impl Timeline {
    pub fn new(user_id: impl Into<String>, program: Program) -> Self {
        Self {
            user_id: Arc::from(user_id.into()),
            program: Arc::new(Mutex::new(program)),
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(user.id.clone(), user.program.clone())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run `f` with exclusive access to the program
    pub fn with_program<R>(&self, f: impl FnOnce(&mut Program) -> R) -> R {
        f(&mut self.program.lock())
    }

    /// Advance against `clock` and return the airing spin
    pub fn now_playing_on(&self, clock: &dyn DateHandler) -> Option<Spin> {
        self.with_program(|program| program.now_playing_on(clock).cloned())
    }

    /// O(1) snapshot of the upcoming playlist
    pub fn playlist(&self) -> Playlist {
        self.program.lock().playlist().clone()
    }

    pub fn snapshot(&self) -> Program {
        self.program.lock().clone()
    }

    /// Wholesale replacement after a server resync
    pub fn replace_program(&self, program: Program) {
        *self.program.lock() = program;
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let program = self.program.lock();
        f.debug_struct("Timeline")
            .field("user_id", &self.user_id)
            .field("now_playing", &program.now_playing().map(|s| s.id.as_str()))
            .field("upcoming", &program.playlist().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use playola_common::model::{AudioBlock, AudioBlockKind};
    use playola_common::time::ManualDateHandler;

    fn spin(id: &str, position: i64, minute: u32) -> Spin {
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
            airtime: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()),
            is_commercial_block: false,
        }
    }

    #[test]
    fn test_clones_share_program() {
        let timeline = Timeline::new("u1", Program::new(None, vec![spin("a", 1, 0), spin("b", 2, 1)]));
        let other = timeline.clone();
        let clock = ManualDateHandler::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 30).unwrap());

        assert_eq!(other.now_playing_on(&clock).map(|s| s.id), Some("a".to_string()));
        assert_eq!(timeline.playlist().len(), 1, "advance is visible through every clone");
        assert_eq!(timeline.user_id(), "u1");
    }

    #[test]
    fn test_snapshot_is_independent() {
        let timeline = Timeline::new("u1", Program::new(None, vec![spin("a", 1, 0)]));
        let snapshot = timeline.snapshot();
        timeline.replace_program(Program::default());

        assert_eq!(snapshot.playlist().len(), 1);
        assert!(timeline.playlist().is_empty());
    }
}
