use serde::Serialize;

use crate::error::{AnalysisError, Result};
use crate::reference::types::{LyricEvent, Note, ReferenceMelody, TimeSignature};

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SongInfo {
    pub id: &'static str,
    pub title: &'static str,
}

pub const TWINKLE_ID: &str = "twinkle";

const TWINKLE_TITLE: &str = "Twinkle Twinkle Little Star (4/4, C major, q=120)";

/// Twinkle Twinkle, ten bars. Each bar is four quarters or two quarters and
/// a half.
const TWINKLE_BARS: [[i32; 4]; 10] = [
    [60, 60, 67, 67],
    [69, 69, 67, -1],
    [65, 65, 64, 64],
    [62, 62, 60, -1],
    [67, 67, 65, 65],
    [64, 64, 62, -1],
    [67, 67, 65, 65],
    [64, 64, 62, -1],
    [60, 60, 67, 67],
    [69, 69, 67, -1],
];

const TWINKLE_LYRICS: [&str; 35] = [
    "Twin", "kle", "twin", "kle", "lit", "tle", "star", //
    "how", "I", "won", "der", "what", "you", "are", //
    "up", "a", "bove", "the", "world", "so", "high", //
    "like", "a", "dia", "mond", "in", "the", "sky", //
    "twin", "kle", "twin", "kle", "lit", "tle", "star",
];

pub fn builtin_songs() -> Vec<SongInfo> {
    vec![SongInfo {
        id: TWINKLE_ID,
        title: TWINKLE_TITLE,
    }]
}

pub fn builtin_reference(id: &str) -> Result<ReferenceMelody> {
    match id {
        TWINKLE_ID => Ok(twinkle()),
        _ => Err(AnalysisError::UnknownSong(id.to_string())),
    }
}

fn twinkle() -> ReferenceMelody {
    let mut notes: Vec<Note> = Vec::new();
    for (bar, pitches) in TWINKLE_BARS.iter().enumerate() {
        let bar_start = bar as f64 * 4.0;
        for (i, &midi) in pitches.iter().enumerate() {
            if midi < 0 {
                // the previous note is held for a half
                if let Some(last) = notes.last_mut() {
                    last.duration_beats = 2.0;
                }
                continue;
            }
            notes.push(Note::new(bar_start + i as f64, 1.0, midi as f64));
        }
    }

    let lyrics = notes
        .iter()
        .zip(TWINKLE_LYRICS.iter())
        .map(|(note, &text)| LyricEvent {
            beat: note.start_beat,
            text: text.to_string(),
        })
        .collect();

    ReferenceMelody {
        title: TWINKLE_TITLE.to_string(),
        tempo_bpm: 120.0,
        time_signature: TimeSignature::default(),
        notes,
        lyrics,
    }
}

/// Short fixed melody (C4 C4 G4-half at 120 BPM) used when an external
/// reference cannot be used.
pub fn demo_melody() -> ReferenceMelody {
    ReferenceMelody {
        title: "Demo melody".to_string(),
        tempo_bpm: 120.0,
        time_signature: TimeSignature::default(),
        notes: vec![
            Note::new(0.0, 1.0, 60.0),
            Note::new(1.0, 1.0, 60.0),
            Note::new(2.0, 2.0, 67.0),
        ],
        lyrics: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twinkle_shape() {
        let m = builtin_reference("twinkle").unwrap();
        assert_eq!(m.notes.len(), 35);
        assert_eq!(m.total_beats(), 40.0);
        assert_eq!(m.tempo_bpm, 120.0);
        assert_eq!(m.lyrics.len(), 35);

        // bar 2 ends on a half-note G at beat 6
        assert_eq!(m.notes[6], Note::new(6.0, 2.0, 67.0));
        assert_eq!(m.notes[7].start_beat, 8.0);
        assert_eq!(m.lyric_at(8.0).map(|l| l.text.as_str()), Some("how"));
        assert_eq!(m.lyric_at(38.0).map(|l| l.text.as_str()), Some("star"));
    }

    #[test]
    fn test_twinkle_notes_do_not_overlap() {
        let m = builtin_reference(TWINKLE_ID).unwrap();
        for w in m.notes.windows(2) {
            assert!(w[0].end_beat() <= w[1].start_beat + 1e-9);
        }
    }

    #[test]
    fn test_unknown_song() {
        let err = builtin_reference("yesterday").unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownSong(ref id) if id == "yesterday"));
    }

    #[test]
    fn test_song_list_resolves() {
        for song in builtin_songs() {
            assert!(builtin_reference(song.id).is_ok(), "{} should load", song.id);
        }
    }

    #[test]
    fn test_demo_melody() {
        let m = demo_melody();
        assert_eq!(m.notes.len(), 3);
        assert_eq!(m.total_beats(), 4.0);
    }
}
