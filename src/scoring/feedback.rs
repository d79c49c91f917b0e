use crate::scoring::types::{AnalysisResult, NoteComparison};

const MAX_TIPS: usize = 5;
const LOW_PITCH_SCORE: u8 = 80;
/// Mean signed pitch error (semitones) that counts as a sharp/flat habit.
const PITCH_BIAS_SEMITONES: f64 = 0.25;
/// Mean signed entry error (beats) that counts as an early/late habit.
const TIMING_BIAS_BEATS: f64 = 0.1;
const MANY_ISSUES: usize = 3;

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Rule-based practice advice for one analysis, most important first.
pub fn coaching_tips(result: &AnalysisResult, comparisons: &[NoteComparison]) -> Vec<String> {
    let mut tips: Vec<String> = Vec::new();

    let sung: Vec<&NoteComparison> = comparisons.iter().filter(|c| !c.is_miss).collect();
    let missed = comparisons.len() - sung.len();

    if result.pitch_score < LOW_PITCH_SCORE && !sung.is_empty() {
        tips.push(format!(
            "Only {}% of your pitch matched the melody. Sustain each note on a long, steady breath.",
            result.pitch_score
        ));
    }

    let pitch_diffs: Vec<f64> = sung.iter().filter_map(|c| c.pitch_diff).collect();
    if let Some(bias) = mean(&pitch_diffs) {
        if bias > PITCH_BIAS_SEMITONES {
            tips.push(format!(
                "You tend to sing sharp (about {:.1} semitones). Relax and aim a little lower.",
                bias
            ));
        } else if bias < -PITCH_BIAS_SEMITONES {
            tips.push(format!(
                "You tend to sing flat (about {:.1} semitones). Lift the pitch with more breath support.",
                bias.abs()
            ));
        }
    }

    let start_diffs: Vec<f64> = sung.iter().map(|c| c.start_diff).collect();
    if let Some(bias) = mean(&start_diffs) {
        if bias > TIMING_BIAS_BEATS {
            tips.push(
                "You come in late. Count the beat before each phrase and breathe ahead of it."
                    .to_string(),
            );
        } else if bias < -TIMING_BIAS_BEATS {
            tips.push("You rush ahead of the beat. Practice along with a metronome.".to_string());
        }
    }

    let clipped = sung
        .iter()
        .filter(|c| c.is_rhythm_duration_error && c.duration_diff < 0.0)
        .count();
    let held = sung
        .iter()
        .filter(|c| c.is_rhythm_duration_error && c.duration_diff > 0.0)
        .count();
    if clipped > 0 && clipped >= held {
        tips.push(format!(
            "{} note{} ended too soon. Hold each note for its full value.",
            clipped,
            plural(clipped)
        ));
    } else if held > 0 {
        tips.push(format!(
            "{} note{} ran too long. Release on time to breathe before the next note.",
            held,
            plural(held)
        ));
    }

    if missed > 0 {
        tips.push(format!(
            "You missed {} note{}. Keep singing through the whole song.",
            missed,
            plural(missed)
        ));
    }

    if result.issues.len() > MANY_ISSUES {
        tips.push("Repeat the hard passages slowly until they feel secure.".to_string());
    }

    if tips.is_empty() {
        tips.push("Steady performance overall. Sing it once more at the same tempo.".to_string());
    }
    tips.truncate(MAX_TIPS);
    tips
}
