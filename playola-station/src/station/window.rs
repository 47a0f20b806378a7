//! Prefetch window
//!
//! The now-playing spin plus every upcoming spin whose airtime falls within
//! the lead time. The playlist is time-ordered, so the scan stops at the
//! first spin outside the window (or the first with no airtime yet).

use chrono::Duration as ChronoDuration;
use playola_common::model::{Program, Spin};
use playola_common::time::DateHandler;

/// Spins to keep downloaded and queued; `program` should already be advanced
pub fn prefetch_window(program: &Program, clock: &dyn DateHandler, lead_time: ChronoDuration) -> Vec<Spin> {
    let horizon = clock.now() + lead_time;
    let upcoming = program
        .playlist()
        .iter()
        .take_while(|spin| spin.airtime.is_some_and(|t| clock.adjusted_date(t) <= horizon));

    program
        .now_playing()
        .into_iter()
        .chain(upcoming)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use playola_common::model::{AudioBlock, AudioBlockKind};
    use playola_common::time::ManualDateHandler;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn spin(id: &str, position: i64, airtime: Option<DateTime<Utc>>) -> Spin {
        Spin {
            id: id.to_string(),
            audio_block: AudioBlock {
                id: format!("{}-block", id),
                kind: AudioBlockKind::Song,
                duration_ms: 120_000,
                boo_ms: 0,
                eoi_ms: 0,
                eom_ms: 120_000,
                title: String::new(),
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

    fn ids(spins: &[Spin]) -> Vec<&str> {
        spins.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_window_is_prefix_within_lead() {
        let mut program = Program::new(
            None,
            (0..6)
                .map(|i| spin(&format!("s{}", i), i, Some(base() + ChronoDuration::minutes(2 * i))))
                .collect(),
        );
        let clock = ManualDateHandler::new(base() + ChronoDuration::seconds(30));
        program.advance_on(&clock);

        let window = prefetch_window(&program, &clock, ChronoDuration::seconds(360));
        // s0 airing; s1 (2:00), s2 (4:00), s3 (6:00) inside 6:30
        assert_eq!(ids(&window), vec!["s0", "s1", "s2", "s3"]);
    }

    #[test]
    fn test_window_stops_at_unresolved_airtime() {
        let program = Program::new(
            Some(spin("now", 0, Some(base()))),
            vec![
                spin("a", 1, Some(base() + ChronoDuration::minutes(1))),
                spin("b", 2, None),
                spin("c", 3, Some(base() + ChronoDuration::minutes(3))),
            ],
        );
        let clock = ManualDateHandler::new(base());

        let window = prefetch_window(&program, &clock, ChronoDuration::seconds(360));
        assert_eq!(ids(&window), vec!["now", "a"]);
    }

    #[test]
    fn test_empty_program() {
        let clock = ManualDateHandler::new(base());
        assert!(prefetch_window(&Program::default(), &clock, ChronoDuration::seconds(360)).is_empty());
    }
}
