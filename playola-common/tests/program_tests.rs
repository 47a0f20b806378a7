//! Timeline behaviour over realistic server payloads

use chrono::{DateTime, Duration, TimeZone, Utc};
use playola_common::model::{
    diff_playlists, AudioBlock, NoCommercials, Program, RotatingCommercials, User,
};
use serde_json::{json, Value};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 14, 18, 0, 0).unwrap()
}

/// A user payload whose playlist has `count` back-to-back three-minute spins
fn user_payload(count: i64) -> Value {
    let playlist: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": format!("spin-{}", i),
                "playlistPosition": i + 1,
                "airtime": (base() + Duration::minutes(3 * i)).to_rfc3339(),
                "audioBlock": {
                    "id": format!("song-{}", i),
                    "__t": "Song",
                    "duration": 185000,
                    "eom": 180000,
                    "title": format!("Track {}", i),
                    "artist": "Band",
                    "audioFileUrl": format!("https://cdn.example.com/audio/track-{}.m4a", i)
                }
            })
        })
        .collect();

    json!({
        "id": "user-1",
        "displayName": "DJ Test",
        "program": { "nowPlaying": null, "playlist": playlist }
    })
}

#[test]
fn test_advance_idempotence() {
    let mut user = User::from_value(&user_payload(10), &NoCommercials).unwrap();
    let now = base() + Duration::minutes(7);

    assert!(user.program.advance_if_due(now));
    let snapshot = user.program.clone();

    assert!(!user.program.advance_if_due(now));
    assert_eq!(user.program, snapshot, "second advance at the same instant changed the program");
}

#[test]
fn test_advance_monotonicity() {
    let mut user = User::from_value(&user_payload(10), &NoCommercials).unwrap();
    let mut seen = Vec::new();

    for seconds in (0..30 * 60).step_by(37) {
        let now = base() + Duration::seconds(seconds);
        if let Some(spin) = user.program.now_playing_at(now) {
            if seen.last() != Some(&spin.id) {
                seen.push(spin.id.clone());
            }
        }
    }

    let expected: Vec<String> = (0..10).map(|i| format!("spin-{}", i)).collect();
    assert_eq!(seen, expected, "now playing must follow playlist order without skipping back");

    let history: Vec<&str> = user
        .program
        .recently_played()
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(history.first(), Some(&"spin-8"));
    assert_eq!(history.last(), Some(&"spin-0"));
}

#[test]
fn test_diff_positions_two_and_three() {
    let user = User::from_value(&user_payload(6), &NoCommercials).unwrap();
    let old = user.program.playlist().clone();

    let mut edited = old.clone();
    {
        let spins = edited.make_mut();
        spins[2].airtime = None;
        spins.swap(3, 5);
        spins[5] = old[5].clone();
    }

    let diff = diff_playlists(&old, &edited);
    assert!(!diff.full_reload);
    assert_eq!(diff.changed_indexes, vec![2, 3]);

    let shorter = old[..5].to_vec();
    assert!(diff_playlists(&old, &shorter).full_reload);
}

#[test]
fn test_commercial_injection_fills_markers_in_order() {
    let mut payload = user_payload(4);
    for idx in [1usize, 3] {
        payload["program"]["playlist"][idx]["isCommercialBlock"] = json!(true);
    }
    let supply = RotatingCommercials::new(vec![
        AudioBlock::commercial_placeholder("break-a", 90_000),
        AudioBlock::commercial_placeholder("break-b", 90_000),
    ]);

    let user = User::from_value(&payload, &supply).unwrap();
    let playlist = user.program.playlist();

    assert_eq!(playlist[1].audio_block.id, "break-a");
    assert_eq!(playlist[3].audio_block.id, "break-b");
    assert_eq!(playlist[0].audio_block.id, "song-0");
}

#[test]
fn test_unresolved_airtimes_flag() {
    let mut payload = user_payload(3);
    payload["program"]["playlist"][2]["airtime"] = Value::Null;

    let user = User::from_value(&payload, &NoCommercials).unwrap();
    assert!(user.program.has_unresolved_airtimes());

    let resolved = User::from_value(&user_payload(3), &NoCommercials).unwrap();
    assert!(!resolved.program.has_unresolved_airtimes());
}

#[test]
fn test_replace_playlist_is_wholesale() {
    let mut program = User::from_value(&user_payload(5), &NoCommercials)
        .unwrap()
        .program;
    let other = User::from_value(&user_payload(2), &NoCommercials)
        .unwrap()
        .program;

    program.replace_playlist(other.playlist().clone());
    assert_eq!(program.playlist().len(), 2);
    assert!(program.playlist().shares_storage_with(other.playlist()));
    assert!(Program::default().playlist().is_empty());
}
