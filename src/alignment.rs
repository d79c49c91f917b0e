use serde::Serialize;

use crate::audio::PreprocessedAudio;
use crate::config::AlignmentConfig;
use crate::pitch::PitchTrack;
use crate::reference::ReferenceMelody;

/// Time shift between reference beat zero and the recording, in seconds.
/// Positive means the singer is late.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct AlignmentOffset {
    pub detected_seconds: f64,
    /// User correction after clamping.
    pub manual_seconds: f64,
    pub applied_seconds: f64,
}

impl AlignmentOffset {
    pub fn new(detected_seconds: f64, manual_seconds: f64, max_manual_seconds: f64) -> Self {
        let manual = clamp_manual_offset(manual_seconds, max_manual_seconds);
        AlignmentOffset {
            detected_seconds,
            manual_seconds: manual,
            applied_seconds: detected_seconds + manual,
        }
    }
}

pub fn clamp_manual_offset(manual_seconds: f64, max_abs: f64) -> f64 {
    if !manual_seconds.is_finite() {
        return 0.0;
    }
    let max_abs = max_abs.abs();
    manual_seconds.clamp(-max_abs, max_abs)
}

fn adaptive_threshold(baseline_rms: f32, config: &AlignmentConfig) -> f32 {
    config.min_rms_threshold.max(baseline_rms * config.baseline_factor)
}

/// Start time of the first short window whose RMS exceeds the adaptive
/// threshold, or 0 when the signal never does.
pub fn detect_singing_start(audio: &PreprocessedAudio, config: &AlignmentConfig) -> f64 {
    let sr = audio.sample_rate as f64;
    let samples = &audio.samples;
    if samples.is_empty() || sr <= 0.0 {
        return 0.0;
    }

    let baseline_len = samples.len().min((sr * config.baseline_seconds) as usize);
    let baseline = if baseline_len == 0 {
        0.0
    } else {
        let energy: f32 = samples[..baseline_len].iter().map(|s| s * s).sum();
        (energy / baseline_len as f32).sqrt()
    };
    let threshold = adaptive_threshold(baseline, config);

    let win = ((sr * config.rms_window_seconds) as usize).max(1);
    let hop = ((sr * config.rms_hop_seconds) as usize).max(1);
    let mut start = 0;
    while start + win < samples.len() {
        let energy: f32 = samples[start..start + win].iter().map(|s| s * s).sum();
        if (energy / win as f32).sqrt() > threshold {
            log::debug!(
                "singing starts at {:.3}s (threshold {:.4}, baseline {:.4})",
                start as f64 / sr,
                threshold,
                baseline
            );
            return start as f64 / sr;
        }
        start += hop;
    }
    log::debug!("no window above threshold {:.4}", threshold);
    0.0
}

fn to_bins(times: &[f64], step: f64) -> Vec<bool> {
    let idx: Vec<usize> = times
        .iter()
        .filter(|t| t.is_finite() && **t >= 0.0)
        .map(|t| (t / step).round() as usize)
        .collect();
    let len = idx.iter().max().map_or(0, |m| m + 1);
    let mut bins = vec![false; len];
    for i in idx {
        bins[i] = true;
    }
    bins
}

/// Shift (seconds) maximising the overlap between user voicing events and
/// reference onset events on a `step` grid, within `±max_shift`.
///
/// Shifts are tried outward from zero (0, -1, +1, -2, ...) and only a
/// strictly better overlap replaces the current best, so ties resolve to the
/// smallest shift.
pub fn fine_offset(user_times: &[f64], reference_times: &[f64], step: f64, max_shift: f64) -> f64 {
    if user_times.is_empty() || reference_times.is_empty() || step <= 0.0 {
        return 0.0;
    }
    let a = to_bins(user_times, step);
    let b = to_bins(reference_times, step);
    let max_bins = (max_shift / step).round().max(0.0) as i64;

    let overlap = |s: i64| -> usize {
        b.iter()
            .enumerate()
            .filter(|(i, &on)| {
                on && {
                    let j = *i as i64 + s;
                    j >= 0 && (j as usize) < a.len() && a[j as usize]
                }
            })
            .count()
    };

    let mut best_shift = 0i64;
    let mut best_score = overlap(0);
    for k in 1..=max_bins {
        for s in [-k, k] {
            let score = overlap(s);
            if score > best_score {
                best_score = score;
                best_shift = s;
            }
        }
    }
    best_shift as f64 * step
}

/// Coarse onset offset refined by event cross-correlation.
///
/// `singing_start` is the detected start of singing in the recording. An
/// empty track or an empty melody gives 0.
pub fn estimate_offset(
    track: &PitchTrack,
    melody: &ReferenceMelody,
    singing_start: f64,
    config: &AlignmentConfig,
) -> f64 {
    let Some(first_beat) = melody.first_note_beat() else {
        return 0.0;
    };
    if track.is_empty() {
        return 0.0;
    }
    let spb = melody.seconds_per_beat();
    let coarse = singing_start - first_beat * spb;

    let residual: Vec<f64> = track
        .times
        .iter()
        .zip(&track.f0)
        .filter(|(_, &f)| f > 0.0)
        .map(|(&t, _)| t - coarse)
        .collect();
    let onsets: Vec<f64> = melody.notes.iter().map(|n| n.start_beat * spb).collect();

    let fine = fine_offset(
        &residual,
        &onsets,
        config.fine_step_seconds,
        config.max_fine_shift_seconds,
    );
    log::debug!(
        "alignment: coarse {:.3}s + fine {:.3}s ({} voiced events)",
        coarse,
        fine,
        residual.len()
    );
    coarse + fine
}
