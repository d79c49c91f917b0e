use crate::config::ScoringConfig;
use crate::pitch::{midi_to_note_name, octave_correct};
use crate::progress::{emit, ProgressSink, ProgressStage};
use crate::reference::{Note, ReferenceMelody};
use crate::scoring::curve::{is_pitch_error, median, UserCurve};
use crate::scoring::types::*;

const NOTE_BATCH: usize = 16;

/// Converts onset times in the recording to reference beats.
pub fn onset_beats(onsets_seconds: &[f64], offset_seconds: f64, seconds_per_beat: f64) -> Vec<f64> {
    if seconds_per_beat <= 0.0 {
        return Vec::new();
    }
    onsets_seconds
        .iter()
        .map(|t| (t - offset_seconds) / seconds_per_beat)
        .collect()
}

/// Share of reference onsets matched by a distinct user onset within
/// `tolerance_beats`. Each reference onset greedily claims the nearest unused
/// user onset; a claim outside the tolerance leaves both unmatched.
pub fn rhythm_score(reference_onsets: &[f64], user_onsets: &[f64], tolerance_beats: f64) -> u8 {
    if reference_onsets.is_empty() || user_onsets.is_empty() {
        return 0;
    }
    let mut used = vec![false; user_onsets.len()];
    let mut matched = 0usize;

    for &target in reference_onsets {
        let mut best_idx: Option<usize> = None;
        let mut best_dist = f64::MAX;
        for (i, &played) in user_onsets.iter().enumerate() {
            if used[i] {
                continue;
            }
            let dist = (played - target).abs();
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }
        if let Some(idx) = best_idx {
            if best_dist <= tolerance_beats {
                used[idx] = true;
                matched += 1;
            }
        }
    }

    (100.0 * matched as f64 / reference_onsets.len() as f64).round() as u8
}

pub fn total_score(pitch_score: u8, rhythm_score: u8, pitch_weight: f64) -> u8 {
    let w = pitch_weight.clamp(0.0, 1.0);
    (w * pitch_score as f64 + (1.0 - w) * rhythm_score as f64)
        .round()
        .clamp(0.0, 100.0) as u8
}

fn note_pitch(note: &Note, user: &UserCurve, config: &ScoringConfig) -> Option<f64> {
    let start = note.start_beat;
    let end = note.end_beat();
    let margin = note.duration_beats * (1.0 - config.stable_region_fraction) / 2.0;

    let mut stable: Vec<f64> = user
        .points_in(start + margin, end - margin)
        .filter_map(|(_, v)| v)
        .collect();
    if stable.is_empty() {
        stable = user.points_in(start, end).filter_map(|(_, v)| v).collect();
    }
    median(&mut stable).map(|m| octave_correct(m, note.midi, config.octave_search_range))
}

fn observed_start(note: &Note, user: &UserCurve, onsets: &[f64], config: &ScoringConfig) -> f64 {
    let start = note.start_beat;
    let nearest_onset = onsets
        .iter()
        .copied()
        .filter(|o| (o - start).abs() <= config.timing_search_beats)
        .min_by(|a, b| (a - start).abs().total_cmp(&(b - start).abs()));
    if let Some(o) = nearest_onset {
        return o;
    }
    user.points_in(start, note.end_beat())
        .find(|(_, v)| v.is_some())
        .map_or(start, |(b, _)| b)
}

/// Last voiced grid point of the run that begins at or after `from`, plus one
/// step. The run stops at the next onset and at the search limit.
fn observed_end(
    note: &Note,
    from: f64,
    user: &UserCurve,
    onsets: &[f64],
    config: &ScoringConfig,
) -> Option<f64> {
    let step = config.beat_step;
    let limit = note.end_beat() + config.timing_search_beats;
    let next_onset = onsets
        .iter()
        .copied()
        .filter(|&o| o > from + 2.0 * step)
        .fold(f64::INFINITY, f64::min);
    let stop = limit.min(next_onset);

    let mut last: Option<f64> = None;
    for (beat, value) in user.points_in(from, limit) {
        match (value, last) {
            (Some(_), _) if beat < stop => last = Some(beat),
            (None, None) => continue,
            _ => break,
        }
    }
    last.map(|b| b + step)
}

pub fn compare_note(
    index: usize,
    note: &Note,
    user: &UserCurve,
    onsets: &[f64],
    config: &ScoringConfig,
) -> NoteComparison {
    let ref_start = note.start_beat;
    let ref_end = note.end_beat();
    let tol_beats = config.effective_rhythm_tolerance_beats();

    let observed_midi = note_pitch(note, user, config);
    let start = observed_start(note, user, onsets, config);
    let end = observed_end(note, start, user, onsets, config)
        .filter(|&e| e > start)
        .unwrap_or(ref_end);

    let pitch_diff = observed_midi.map(|m| m - note.midi);
    let start_diff = start - ref_start;
    let end_diff = end - ref_end;
    let duration_diff = (end - start) - note.duration_beats;

    let is_miss = observed_midi.is_none();
    let pitch_wrong =
        pitch_diff.is_some_and(|d| is_pitch_error(d, config.pitch_tolerance_semitones()));
    let start_wrong = start_diff.abs() > tol_beats;
    let duration_wrong = duration_diff.abs() > tol_beats;

    NoteComparison {
        index,
        reference_start_beat: ref_start,
        reference_end_beat: ref_end,
        reference_midi: note.midi,
        observed_start_beat: start,
        observed_end_beat: end,
        observed_midi,
        pitch_diff,
        start_diff,
        end_diff,
        duration_diff,
        is_pitch_error: pitch_wrong,
        is_rhythm_start_error: start_wrong,
        is_rhythm_duration_error: duration_wrong,
        is_miss,
        is_correct: !is_miss && !pitch_wrong && !start_wrong && !duration_wrong,
    }
}

/// Compares every reference note against the processed user curve.
/// `onsets` are user onsets in reference beats.
pub fn compare_notes(
    melody: &ReferenceMelody,
    user: &UserCurve,
    onsets: &[f64],
    config: &ScoringConfig,
    progress: &mut dyn ProgressSink,
) -> Vec<NoteComparison> {
    let total = melody.notes.len();
    let mut out = Vec::with_capacity(total);
    for (i, note) in melody.notes.iter().enumerate() {
        out.push(compare_note(i, note, user, onsets, config));
        if (i + 1) % NOTE_BATCH == 0 {
            emit(progress, ProgressStage::Comparison, (i + 1) as f32 / total as f32);
        }
    }
    emit(progress, ProgressStage::Comparison, 1.0);
    out
}

fn describe(c: &NoteComparison, kinds: &[IssueKind]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for kind in kinds {
        match kind {
            IssueKind::Missed => parts.push("not sung".to_string()),
            IssueKind::WrongPitch => {
                if let Some(d) = c.pitch_diff {
                    let dir = if d > 0.0 { "sharp" } else { "flat" };
                    parts.push(format!("{:.1} semitones {}", d.abs(), dir));
                }
            }
            IssueKind::Start => {
                let dir = if c.start_diff > 0.0 { "late" } else { "early" };
                parts.push(format!("came in {:.2} beats {}", c.start_diff.abs(), dir));
            }
            IssueKind::Duration => {
                let dir = if c.duration_diff > 0.0 { "too long" } else { "too short" };
                parts.push(format!("held {:.2} beats {}", c.duration_diff.abs(), dir));
            }
        }
    }
    format!(
        "{} at beat {}: {}",
        midi_to_note_name(c.reference_midi),
        c.reference_start_beat + 1.0,
        parts.join(", ")
    )
}

/// One issue per note that is not correct, in note order.
pub fn build_issues(comparisons: &[NoteComparison]) -> Vec<NoteIssue> {
    comparisons
        .iter()
        .filter(|c| !c.is_correct)
        .map(|c| {
            let mut kinds = Vec::new();
            if c.is_miss {
                kinds.push(IssueKind::Missed);
            }
            if c.is_pitch_error {
                kinds.push(IssueKind::WrongPitch);
            }
            if !c.is_miss && c.is_rhythm_start_error {
                kinds.push(IssueKind::Start);
            }
            if !c.is_miss && c.is_rhythm_duration_error {
                kinds.push(IssueKind::Duration);
            }
            NoteIssue {
                note_index: c.index,
                start_beat: c.reference_start_beat,
                note_name: midi_to_note_name(c.reference_midi),
                message: describe(c, &kinds),
                kinds,
                pitch_diff: c.pitch_diff,
                start_diff: c.start_diff,
                duration_diff: c.duration_diff,
            }
        })
        .collect()
}

pub fn summarize(
    pitch_score: u8,
    rhythm_score: u8,
    comparisons: &[NoteComparison],
    config: &ScoringConfig,
) -> AnalysisResult {
    let total_score = total_score(pitch_score, rhythm_score, config.pitch_weight);
    AnalysisResult {
        pitch_score,
        rhythm_score,
        total_score,
        verdict: Verdict::from_total(total_score, config.verdict_thresholds),
        issues: build_issues(comparisons),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::reference::TimeSignature;

    fn demo() -> ReferenceMelody {
        ReferenceMelody {
            title: "demo".to_string(),
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

    /// Curve on the 0.05 grid from -0.5 to 4.5 beats; `f` gives the value per beat.
    fn curve(f: impl Fn(f64) -> Option<f64>) -> UserCurve {
        let first_index = -10i64;
        let values = (0..=100)
            .map(|k| f((first_index + k as i64) as f64 * 0.05))
            .collect();
        UserCurve {
            beat_step: 0.05,
            first_index,
            values,
        }
    }

    fn sung(b: f64) -> Option<f64> {
        // each note voiced for 90% of its length
        match b {
            b if (0.0..0.9).contains(&b) => Some(60.1),
            b if (1.0..1.9).contains(&b) => Some(59.9),
            b if (2.0..3.8).contains(&b) => Some(67.0),
            _ => None,
        }
    }

    #[test]
    fn test_rhythm_score_greedy_matching() {
        assert_eq!(rhythm_score(&[0.0, 1.0, 2.0], &[0.05, 1.1, 1.9], 0.25), 100);
        assert_eq!(rhythm_score(&[0.0, 1.0, 2.0], &[0.95, 1.95, 2.95], 0.25), 67);
        assert_eq!(rhythm_score(&[0.0, 1.0, 2.0], &[0.1], 0.25), 33);
        // one user onset cannot satisfy two reference onsets
        assert_eq!(rhythm_score(&[1.0, 1.1], &[1.05], 0.25), 50);
        assert_eq!(rhythm_score(&[], &[1.0], 0.25), 0);
        assert_eq!(rhythm_score(&[1.0], &[], 0.25), 0);
    }

    #[test]
    fn test_onset_beats() {
        let b = onset_beats(&[0.5, 1.0], 0.5, 0.5);
        assert_eq!(b, vec![0.0, 1.0]);
        assert!(onset_beats(&[0.5], 0.0, 0.0).is_empty());
    }

    #[test]
    fn test_total_score_weighting() {
        assert_eq!(total_score(100, 100, 0.6), 100);
        assert_eq!(total_score(100, 0, 0.6), 60);
        assert_eq!(total_score(50, 75, 0.6), 60);
        assert_eq!(total_score(0, 0, 0.6), 0);
    }

    #[test]
    fn test_clean_performance_is_correct() {
        let user = curve(sung);
        let onsets = [0.0, 1.0, 2.0];
        let config = ScoringConfig::default();
        let comps = compare_notes(&demo(), &user, &onsets, &config, &mut NoopProgress);
        assert_eq!(comps.len(), 3);
        for c in &comps {
            assert!(c.is_correct, "note {} flagged: {:?}", c.index, c);
            assert!(c.start_diff.abs() < 1e-9);
        }
        assert!((comps[0].observed_end_beat - 0.9).abs() < 1e-9);
        assert!((comps[2].observed_end_beat - 3.8).abs() < 1e-9);
        assert!(build_issues(&comps).is_empty());
    }

    #[test]
    fn test_silence_is_all_misses() {
        let user = curve(|_| None);
        let config = ScoringConfig::default();
        let comps = compare_notes(&demo(), &user, &[], &config, &mut NoopProgress);
        assert!(comps.iter().all(|c| c.is_miss && !c.is_correct));
        assert!(comps
            .iter()
            .all(|c| c.observed_start_beat == c.reference_start_beat
                && c.observed_end_beat == c.reference_end_beat));
        let issues = build_issues(&comps);
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|i| i.kinds == vec![IssueKind::Missed]));
        assert_eq!(issues[0].message, "C4 at beat 1: not sung");
    }

    #[test]
    fn test_stable_region_ignores_scoop() {
        // starts a third low, settles on pitch after 20% of the note
        let user = curve(|b| match b {
            b if (0.0..0.15).contains(&b) => Some(56.0),
            b if (0.15..0.9).contains(&b) => Some(60.0),
            _ => None,
        });
        let melody = ReferenceMelody {
            notes: vec![Note::new(0.0, 1.0, 60.0)],
            ..demo()
        };
        let comps = compare_notes(&melody, &user, &[0.0], &ScoringConfig::default(), &mut NoopProgress);
        let c = &comps[0];
        assert_eq!(c.observed_midi, Some(60.0));
        assert!(!c.is_pitch_error);
    }

    #[test]
    fn test_late_and_sharp_note() {
        let user = curve(|b| match b {
            b if (0.3..0.9).contains(&b) => Some(61.0),
            _ => None,
        });
        let melody = ReferenceMelody {
            notes: vec![Note::new(0.0, 1.0, 60.0)],
            ..demo()
        };
        let comps = compare_notes(&melody, &user, &[0.3], &ScoringConfig::default(), &mut NoopProgress);
        let c = &comps[0];
        assert!(c.is_pitch_error);
        assert!(c.is_rhythm_start_error);
        assert!((c.start_diff - 0.3).abs() < 1e-9);
        assert!(!c.is_correct);

        let issues = build_issues(std::slice::from_ref(c));
        assert_eq!(
            issues[0].kinds,
            vec![IssueKind::WrongPitch, IssueKind::Start, IssueKind::Duration]
        );
        assert!(issues[0].message.contains("1.0 semitones sharp"), "{}", issues[0].message);
        assert!(issues[0].message.contains("late"));
    }

    #[test]
    fn test_run_stops_at_next_onset() {
        // legato into the next note: voicing never breaks
        let user = curve(|b| if (0.0..2.0).contains(&b) { Some(60.0) } else { None });
        let onsets = [0.0, 1.0];
        let config = ScoringConfig::default();
        let comps = compare_notes(&demo(), &user, &onsets, &config, &mut NoopProgress);
        assert!((comps[0].observed_end_beat - 1.0).abs() < 1e-9);
        assert!(!comps[0].is_rhythm_duration_error);
    }

    #[test]
    fn test_summarize() {
        let config = ScoringConfig::default();
        let r = summarize(100, 100, &[], &config);
        assert_eq!(r.total_score, 100);
        assert_eq!(r.verdict, Verdict::Excellent);
        let r = summarize(0, 0, &[], &config);
        assert_eq!(r.verdict, Verdict::NeedsPractice);
    }
}
