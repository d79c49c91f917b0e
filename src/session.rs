use serde::Serialize;

use crate::alignment::{detect_singing_start, estimate_offset, AlignmentOffset};
use crate::audio::{preprocess, RawAudio};
use crate::config::{validate_config, AnalysisConfig};
use crate::error::{AnalysisError, Result};
use crate::pitch::{detect_onsets, track_pitch, PitchTrack};
use crate::progress::{emit, ProgressSink, ProgressStage};
use crate::reference::{normalize_reference, LyricEvent, Note, ReferenceMelody};
use crate::scoring::{
    build_user_curve, coaching_tips, compare_curve, compare_notes, onset_beats, pitch_score,
    rhythm_score, summarize, AnalysisResult, NoteComparison, NoteIssue, PitchCurve, UserCurve,
    Verdict,
};

/// Everything one analysis run produced, owned by the caller.
///
/// Playback and charting collaborators read from here instead of shared
/// state; two sessions never share buffers.
#[derive(Clone, Debug)]
pub struct AnalysisSession {
    pub reference: ReferenceMelody,
    pub config: AnalysisConfig,
    pub track: PitchTrack,
    /// Onset times in the recording, seconds.
    pub onsets: Vec<f64>,
    /// `onsets` mapped onto the reference beat axis with the applied offset.
    pub onset_beats: Vec<f64>,
    pub offset: AlignmentOffset,
    pub user_curve: UserCurve,
    pub pitch_curve: PitchCurve,
    pub comparisons: Vec<NoteComparison>,
    pub result: AnalysisResult,
    pub tips: Vec<String>,
}

/// Flat export payload for JSON / PDF renderers.
#[derive(Serialize, Clone, Debug)]
pub struct AnalysisReport {
    pub title: String,
    pub tempo_bpm: f64,
    pub pitch_score: u8,
    pub rhythm_score: u8,
    pub total_score: u8,
    pub verdict: Verdict,
    pub verdict_label: String,
    pub offset: AlignmentOffset,
    pub issues: Vec<NoteIssue>,
    pub comparisons: Vec<NoteComparison>,
    pub tips: Vec<String>,
    pub onset_beats: Vec<f64>,
}

struct Scored {
    onset_beats: Vec<f64>,
    user_curve: UserCurve,
    pitch_curve: PitchCurve,
    comparisons: Vec<NoteComparison>,
    result: AnalysisResult,
    tips: Vec<String>,
}

fn score(
    track: &PitchTrack,
    onsets: &[f64],
    reference: &ReferenceMelody,
    offset_seconds: f64,
    config: &AnalysisConfig,
    progress: &mut dyn ProgressSink,
) -> Scored {
    let scoring = &config.scoring;

    let user_curve = build_user_curve(track, reference, offset_seconds, scoring);
    let samples = normalize_reference(reference, scoring.beat_step);
    let pitch_curve = compare_curve(&samples, &user_curve, scoring.pitch_tolerance_semitones());
    if pitch_curve.comparable == 0 {
        log::warn!("no comparable pitch samples, pitch score is 0");
    }
    let pitch = pitch_score(&pitch_curve);

    let onset_beats = onset_beats(onsets, offset_seconds, reference.seconds_per_beat());
    let reference_onsets: Vec<f64> = reference.notes.iter().map(|n| n.start_beat).collect();
    let rhythm = rhythm_score(
        &reference_onsets,
        &onset_beats,
        scoring.onset_match_tolerance_beats,
    );

    let comparisons = compare_notes(reference, &user_curve, &onset_beats, scoring, progress);
    let result = summarize(pitch, rhythm, &comparisons, scoring);
    let tips = coaching_tips(&result, &comparisons);

    log::debug!(
        "scores: pitch {} ({} / {} samples), rhythm {}, total {} ({:?}), {} issues",
        result.pitch_score,
        pitch_curve.correct,
        pitch_curve.comparable,
        result.rhythm_score,
        result.total_score,
        result.verdict,
        result.issues.len()
    );

    Scored {
        onset_beats,
        user_curve,
        pitch_curve,
        comparisons,
        result,
        tips,
    }
}

impl AnalysisSession {
    /// Runs the full pipeline on one recording.
    ///
    /// Input problems (bad config, malformed or too-short audio, a reference
    /// with unbounded note spans) are returned before any stage runs. Silence
    /// or an empty reference are not errors: they come back as a zero-score
    /// session.
    pub fn run(
        raw: &RawAudio,
        reference: ReferenceMelody,
        manual_offset_seconds: f64,
        config: &AnalysisConfig,
        progress: &mut dyn ProgressSink,
    ) -> Result<Self> {
        validate_config(config)?;
        raw.validate()?;
        reference
            .validate()
            .map_err(|msg| AnalysisError::InvalidInput(format!("reference: {}", msg)))?;
        let duration = raw.duration_seconds();
        if duration < config.min_duration_seconds {
            return Err(AnalysisError::AudioTooShort {
                duration_seconds: duration,
                min_seconds: config.min_duration_seconds,
            });
        }
        log::debug!(
            "analysing {:.2}s of audio ({} ch @ {} Hz) against '{}' ({} notes, {} bpm)",
            duration,
            raw.channels.len(),
            raw.sample_rate,
            reference.title,
            reference.notes.len(),
            reference.tempo_bpm
        );

        let audio = preprocess(raw, &config.preprocess);
        emit(progress, ProgressStage::Preprocess, 1.0);

        let track = track_pitch(&audio, &config.pitch, progress);
        if track.is_empty() {
            log::warn!("pitch track is empty, recording shorter than one frame");
        }
        let onsets = detect_onsets(&track, &config.onset);

        let singing_start = detect_singing_start(&audio, &config.alignment);
        let detected = estimate_offset(&track, &reference, singing_start, &config.alignment);
        let offset = AlignmentOffset::new(
            detected,
            manual_offset_seconds,
            config.alignment.max_manual_offset_seconds,
        );
        emit(progress, ProgressStage::Alignment, 1.0);
        log::debug!(
            "offset: detected {:.3}s, manual {:.3}s, applied {:.3}s",
            offset.detected_seconds,
            offset.manual_seconds,
            offset.applied_seconds
        );

        let scored = score(
            &track,
            &onsets,
            &reference,
            offset.applied_seconds,
            config,
            progress,
        );

        Ok(Self {
            reference,
            config: config.clone(),
            track,
            onsets,
            onset_beats: scored.onset_beats,
            offset,
            user_curve: scored.user_curve,
            pitch_curve: scored.pitch_curve,
            comparisons: scored.comparisons,
            result: scored.result,
            tips: scored.tips,
        })
    }

    /// Re-scores with a new manual correction, keeping the pitch track and the
    /// detected offset.
    pub fn realign(&mut self, manual_offset_seconds: f64, progress: &mut dyn ProgressSink) {
        self.offset = AlignmentOffset::new(
            self.offset.detected_seconds,
            manual_offset_seconds,
            self.config.alignment.max_manual_offset_seconds,
        );
        let scored = score(
            &self.track,
            &self.onsets,
            &self.reference,
            self.offset.applied_seconds,
            &self.config,
            progress,
        );
        self.onset_beats = scored.onset_beats;
        self.user_curve = scored.user_curve;
        self.pitch_curve = scored.pitch_curve;
        self.comparisons = scored.comparisons;
        self.result = scored.result;
        self.tips = scored.tips;
    }

    /// Position in the recording where reference `beat` was sung.
    pub fn beat_to_recording_seconds(&self, beat: f64) -> f64 {
        beat * self.reference.seconds_per_beat() + self.offset.applied_seconds
    }

    pub fn recording_seconds_to_beat(&self, seconds: f64) -> f64 {
        (seconds - self.offset.applied_seconds) / self.reference.seconds_per_beat()
    }

    /// Reference note being sung at `seconds` into the recording.
    pub fn note_at_seconds(&self, seconds: f64) -> Option<&Note> {
        self.reference
            .note_at(self.recording_seconds_to_beat(seconds))
    }

    pub fn lyric_at_beat(&self, beat: f64) -> Option<&LyricEvent> {
        self.reference.lyric_at(beat)
    }

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            title: self.reference.title.clone(),
            tempo_bpm: self.reference.tempo_bpm,
            pitch_score: self.result.pitch_score,
            rhythm_score: self.result.rhythm_score,
            total_score: self.result.total_score,
            verdict: self.result.verdict,
            verdict_label: self.result.verdict.label().to_string(),
            offset: self.offset,
            issues: self.result.issues.clone(),
            comparisons: self.comparisons.clone(),
            tips: self.tips.clone(),
            onset_beats: self.onset_beats.clone(),
        }
    }

    pub fn report_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.report())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoopProgress, ProgressEvent};
    use crate::reference::demo_melody;
    use std::f32::consts::PI;

    fn test_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.pitch.frame_size = 1024;
        config.pitch.hop_size = 128;
        config
    }

    /// Demo melody sung `delay` seconds into a 16 kHz recording.
    fn sung_demo(delay: f32, seconds: f32) -> RawAudio {
        let sr = 16_000u32;
        let spans = [(0.0f32, 0.45f32, 261.63f32), (0.5, 0.95, 261.63), (1.0, 1.9, 392.0)];
        let n = (seconds * sr as f32) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32 - delay;
                spans
                    .iter()
                    .find(|(s, e, _)| t >= *s && t < *e)
                    .map_or(0.0, |&(s, e, f)| {
                        let fade = ((t - s) / 0.01).min((e - t) / 0.01).min(1.0);
                        0.6 * fade * (2.0 * PI * f * t).sin()
                    })
            })
            .collect();
        RawAudio::mono(samples, sr)
    }

    #[test]
    fn test_beat_time_conversion_uses_applied_offset() {
        let session = AnalysisSession::run(
            &sung_demo(0.0, 2.5),
            demo_melody(),
            0.25,
            &test_config(),
            &mut NoopProgress,
        )
        .unwrap();
        let applied = session.offset.applied_seconds;
        assert!((session.beat_to_recording_seconds(2.0) - (1.0 + applied)).abs() < 1e-12);
        assert!((session.recording_seconds_to_beat(1.0 + applied) - 2.0).abs() < 1e-12);
        assert_eq!(session.offset.manual_seconds, 0.25);
    }

    #[test]
    fn test_realign_keeps_detected_offset() {
        let mut session = AnalysisSession::run(
            &sung_demo(0.0, 2.5),
            demo_melody(),
            0.0,
            &test_config(),
            &mut NoopProgress,
        )
        .unwrap();
        let detected = session.offset.detected_seconds;
        let before = session.result.rhythm_score;

        session.realign(0.5, &mut NoopProgress);
        assert_eq!(session.offset.detected_seconds, detected);
        assert!((session.offset.applied_seconds - (detected + 0.5)).abs() < 1e-12);
        assert!(
            session.result.rhythm_score < before,
            "a one-beat misalignment should cost rhythm points ({} vs {})",
            session.result.rhythm_score,
            before
        );

        session.realign(0.0, &mut NoopProgress);
        assert_eq!(session.result.rhythm_score, before);
    }

    #[test]
    fn test_progress_covers_every_stage() {
        let mut events: Vec<ProgressEvent> = Vec::new();
        let mut sink = |e: ProgressEvent| events.push(e);
        AnalysisSession::run(
            &sung_demo(0.0, 2.5),
            demo_melody(),
            0.0,
            &test_config(),
            &mut sink,
        )
        .unwrap();
        for stage in [
            ProgressStage::Preprocess,
            ProgressStage::PitchTracking,
            ProgressStage::Alignment,
            ProgressStage::Comparison,
        ] {
            assert!(
                events.iter().any(|e| e.stage == stage && e.progress == 1.0),
                "missing completion event for {:?}",
                stage
            );
        }
    }

    #[test]
    fn test_note_lookup_by_recording_time() {
        let session = AnalysisSession::run(
            &sung_demo(0.0, 2.5),
            demo_melody(),
            0.0,
            &test_config(),
            &mut NoopProgress,
        )
        .unwrap();
        let applied = session.offset.applied_seconds;
        let note = session.note_at_seconds(1.2 + applied).unwrap();
        assert_eq!(note.midi, 67.0);
        assert!(session.note_at_seconds(applied - 1.0).is_none());
    }

    #[test]
    fn test_lyrics_follow_the_reference() {
        let twinkle = crate::reference::builtin_reference("twinkle").unwrap();
        let session = AnalysisSession::run(
            &sung_demo(0.0, 2.5),
            twinkle,
            0.0,
            &test_config(),
            &mut NoopProgress,
        )
        .unwrap();
        assert_eq!(session.lyric_at_beat(0.0).map(|l| l.text.as_str()), Some("Twin"));
        assert_eq!(session.lyric_at_beat(8.0).map(|l| l.text.as_str()), Some("how"));
        assert!(session.lyric_at_beat(7.0).is_none(), "beat 7 is inside a held note");
        assert_eq!(session.comparisons.len(), 35);
    }

    #[test]
    fn test_unbounded_reference_is_rejected() {
        for note in [
            Note::new(0.0, f64::INFINITY, 60.0),
            Note::new(1e12, 1.0, 60.0),
            Note::new(0.0, 1.0, f64::NAN),
        ] {
            let reference = ReferenceMelody {
                notes: vec![note],
                ..demo_melody()
            };
            let err = AnalysisSession::run(
                &sung_demo(0.0, 2.5),
                reference,
                0.0,
                &test_config(),
                &mut NoopProgress,
            )
            .unwrap_err();
            match err {
                AnalysisError::InvalidInput(msg) => {
                    assert!(msg.starts_with("reference: "), "{}", msg)
                }
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[test]
    fn test_report_json_shape() {
        let session = AnalysisSession::run(
            &sung_demo(0.0, 2.5),
            demo_melody(),
            0.0,
            &test_config(),
            &mut NoopProgress,
        )
        .unwrap();
        let json = session.report_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["title"], "Demo melody");
        assert_eq!(value["comparisons"].as_array().unwrap().len(), 3);
        assert!(value["offset"]["applied_seconds"].is_number());
        assert!(value["verdict_label"].is_string());
    }
}
