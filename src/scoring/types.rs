use serde::{Deserialize, Serialize};

/// One point of the continuous pitch comparison on the beat grid.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CurvePoint {
    pub beat: f64,
    pub reference_midi: Option<f64>,
    pub user_midi: Option<f64>,
    /// Both pitches present and further apart than the tolerance.
    pub incorrect: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PitchCurve {
    pub beat_step: f64,
    pub points: Vec<CurvePoint>,
    pub comparable: usize,
    pub correct: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NoteComparison {
    pub index: usize,
    pub reference_start_beat: f64,
    pub reference_end_beat: f64,
    pub reference_midi: f64,
    pub observed_start_beat: f64,
    pub observed_end_beat: f64,
    pub observed_midi: Option<f64>,
    /// User minus reference, in semitones.
    pub pitch_diff: Option<f64>,
    pub start_diff: f64,
    pub end_diff: f64,
    pub duration_diff: f64,
    pub is_pitch_error: bool,
    pub is_rhythm_start_error: bool,
    pub is_rhythm_duration_error: bool,
    /// No voiced estimate anywhere in the note.
    pub is_miss: bool,
    pub is_correct: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Missed,
    WrongPitch,
    Start,
    Duration,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NoteIssue {
    pub note_index: usize,
    pub start_beat: f64,
    pub note_name: String,
    pub kinds: Vec<IssueKind>,
    pub pitch_diff: Option<f64>,
    pub start_diff: f64,
    pub duration_diff: f64,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NeedsPractice,
    Fair,
    Good,
    Excellent,
}

impl Verdict {
    /// `thresholds` are descending minimum totals for Excellent, Good, Fair.
    pub fn from_total(total: u8, thresholds: [u8; 3]) -> Self {
        if total >= thresholds[0] {
            Verdict::Excellent
        } else if total >= thresholds[1] {
            Verdict::Good
        } else if total >= thresholds[2] {
            Verdict::Fair
        } else {
            Verdict::NeedsPractice
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Excellent => "Excellent!",
            Verdict::Good => "Good",
            Verdict::Fair => "Not bad",
            Verdict::NeedsPractice => "Keep practicing",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisResult {
    pub pitch_score: u8,
    pub rhythm_score: u8,
    pub total_score: u8,
    pub verdict: Verdict,
    pub issues: Vec<NoteIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_tiers() {
        let t = [90, 75, 60];
        assert_eq!(Verdict::from_total(100, t), Verdict::Excellent);
        assert_eq!(Verdict::from_total(90, t), Verdict::Excellent);
        assert_eq!(Verdict::from_total(89, t), Verdict::Good);
        assert_eq!(Verdict::from_total(75, t), Verdict::Good);
        assert_eq!(Verdict::from_total(60, t), Verdict::Fair);
        assert_eq!(Verdict::from_total(59, t), Verdict::NeedsPractice);
        assert_eq!(Verdict::from_total(0, t), Verdict::NeedsPractice);
        assert!(Verdict::Excellent > Verdict::Good);
    }

    #[test]
    fn test_issue_kind_json() {
        let json = serde_json::to_string(&vec![IssueKind::WrongPitch, IssueKind::Missed]).unwrap();
        assert_eq!(json, r#"["wrong_pitch","missed"]"#);
    }
}
