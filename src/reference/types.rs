use serde::{Deserialize, Serialize};

/// Longest melody, in beats, that a reference may span.
pub const MAX_REFERENCE_BEATS: f64 = 4096.0;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Note {
    pub start_beat: f64,
    pub duration_beats: f64,
    /// Semitone number, 69 = A4. Fractional values are allowed.
    pub midi: f64,
}

impl Note {
    pub fn new(start_beat: f64, duration_beats: f64, midi: f64) -> Self {
        Note {
            start_beat,
            duration_beats,
            midi,
        }
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }

    /// Half-open `[start, end)` coverage test.
    pub fn covers(&self, beat: f64) -> bool {
        beat >= self.start_beat && beat < self.end_beat()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LyricEvent {
    pub beat: f64,
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
        }
    }
}

/// Symbolic melody a recording is graded against. Times are in beats.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReferenceMelody {
    pub title: String,
    pub tempo_bpm: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub lyrics: Vec<LyricEvent>,
}

impl ReferenceMelody {
    pub fn seconds_per_beat(&self) -> f64 {
        if self.tempo_bpm > 0.0 && self.tempo_bpm.is_finite() {
            60.0 / self.tempo_bpm
        } else {
            0.5
        }
    }

    /// End of the last sounding note, 0 for an empty melody.
    pub fn total_beats(&self) -> f64 {
        self.notes
            .iter()
            .map(Note::end_beat)
            .fold(0.0, f64::max)
    }

    /// Earliest note start, or `None` when there are no notes.
    pub fn first_note_beat(&self) -> Option<f64> {
        self.notes
            .iter()
            .map(|n| n.start_beat)
            .min_by(f64::total_cmp)
    }

    /// First note (in list order) whose span covers `beat`.
    pub fn note_at(&self, beat: f64) -> Option<&Note> {
        self.notes.iter().find(|n| n.covers(beat))
    }

    pub fn lyric_at(&self, beat: f64) -> Option<&LyricEvent> {
        self.lyrics.iter().find(|l| (l.beat - beat).abs() < 1e-9)
    }

    /// Checks the tempo and every note span. A melody without notes passes.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.tempo_bpm > 0.0 && self.tempo_bpm.is_finite()) {
            return Err(format!("invalid tempo {}", self.tempo_bpm));
        }
        for (i, note) in self.notes.iter().enumerate() {
            if !(note.start_beat.is_finite() && note.start_beat >= 0.0) {
                return Err(format!("note {} starts at beat {}", i, note.start_beat));
            }
            if !(note.duration_beats.is_finite() && note.duration_beats > 0.0) {
                return Err(format!("note {} lasts {} beats", i, note.duration_beats));
            }
            if !note.midi.is_finite() {
                return Err(format!("note {} has pitch {}", i, note.midi));
            }
        }
        let total = self.total_beats();
        if total > MAX_REFERENCE_BEATS {
            return Err(format!(
                "melody spans {} beats, at most {} allowed",
                total, MAX_REFERENCE_BEATS
            ));
        }
        Ok(())
    }
}
