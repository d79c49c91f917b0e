use crate::config::ScoringConfig;
use crate::pitch::{octave_correct, PitchTrack};
use crate::reference::{ReferenceMelody, ReferenceSamples};
use crate::scoring::types::{CurvePoint, PitchCurve};

/// Strictly outside the tolerance band counts as wrong; the boundary itself
/// is still in tune.
pub fn is_pitch_error(diff_semitones: f64, tolerance_semitones: f64) -> bool {
    diff_semitones.abs() > tolerance_semitones
}

/// Processed user pitch sampled on the reference beat grid, extended by the
/// timing search margin on both sides.
#[derive(Clone, Debug, PartialEq)]
pub struct UserCurve {
    pub beat_step: f64,
    /// Grid index of `values[0]`; beat of slot `k` is `(first_index + k) * beat_step`.
    pub first_index: i64,
    pub values: Vec<Option<f64>>,
}

impl UserCurve {
    pub fn beat(&self, k: usize) -> f64 {
        (self.first_index + k as i64) as f64 * self.beat_step
    }

    fn slot(&self, beat: f64) -> Option<usize> {
        if !beat.is_finite() || self.beat_step <= 0.0 {
            return None;
        }
        let k = (beat / self.beat_step).round() as i64 - self.first_index;
        if k < 0 || k as usize >= self.values.len() {
            return None;
        }
        Some(k as usize)
    }

    pub fn value_at(&self, beat: f64) -> Option<f64> {
        self.slot(beat).and_then(|k| self.values[k])
    }

    /// `(beat, value)` for grid points in `[from, to)`, unvoiced ones included.
    pub fn points_in(&self, from: f64, to: f64) -> impl Iterator<Item = (f64, Option<f64>)> + '_ {
        let eps = self.beat_step * 1e-6;
        (0..self.values.len())
            .map(move |k| (self.beat(k), self.values[k]))
            .filter(move |(b, _)| *b >= from - eps && *b < to - eps)
    }
}

/// Upper median of the present values, `None` when there are none.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[values.len() / 2])
}

/// Median over a centred window, skipping unvoiced slots. Unvoiced slots stay
/// unvoiced.
pub fn median_smooth(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let half = window / 2;
    let mut scratch = Vec::with_capacity(window);
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.and_then(|_| {
                let lo = i.saturating_sub(half);
                let hi = (i + half + 1).min(values.len());
                scratch.clear();
                scratch.extend(values[lo..hi].iter().flatten().copied());
                median(&mut scratch)
            })
        })
        .collect()
}

pub fn clamp_values(values: &mut [Option<f64>], low: f64, high: f64) {
    for v in values.iter_mut().flatten() {
        *v = v.clamp(low, high);
    }
}

/// Drops isolated values that jump more than `threshold` semitones away from
/// both present neighbours.
pub fn despike(values: &[Option<f64>], threshold: f64) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    for i in 1..values.len().saturating_sub(1) {
        if let (Some(prev), Some(cur), Some(next)) = (values[i - 1], values[i], values[i + 1]) {
            if (cur - prev).abs() > threshold && (cur - next).abs() > threshold {
                out[i] = None;
            }
        }
    }
    out
}

/// Exponential smoothing over runs of consecutive present values. A jump of
/// more than `reset_semitones` from the smoothed value starts a new run, so
/// one note does not bleed into the next.
pub fn ema(values: &mut [Option<f64>], alpha: f64, reset_semitones: f64) {
    for i in 1..values.len() {
        if let (Some(prev), Some(cur)) = (values[i - 1], values[i]) {
            if (cur - prev).abs() <= reset_semitones {
                values[i] = Some(alpha * cur + (1.0 - alpha) * prev);
            }
        }
    }
}

/// Samples the pitch track at `t = beat * spb + offset` on the beat grid and
/// runs median, octave correction, clamp, despike and EMA over it.
pub fn build_user_curve(
    track: &PitchTrack,
    melody: &ReferenceMelody,
    offset_seconds: f64,
    config: &ScoringConfig,
) -> UserCurve {
    let step = config.beat_step;
    let margin = (config.timing_search_beats / step - 1e-9).ceil() as i64;
    let first_index = -margin;
    let last_index = ((melody.total_beats() + config.timing_search_beats) / step + 1e-9).floor() as i64;
    let len = (last_index - first_index + 1).max(0) as usize;
    let spb = melody.seconds_per_beat();

    let beats: Vec<f64> = (0..len)
        .map(|k| (first_index + k as i64) as f64 * step)
        .collect();
    let raw: Vec<Option<f64>> = beats
        .iter()
        .map(|&b| {
            track
                .frame_at(b * spb + offset_seconds)
                .and_then(|i| track.midi_at(i))
        })
        .collect();

    let mut values = median_smooth(&raw, config.smoothing_window_frames);
    for (v, &b) in values.iter_mut().zip(&beats) {
        if let (Some(u), Some(note)) = (*v, melody.note_at(b)) {
            *v = Some(octave_correct(u, note.midi, config.octave_search_range));
        }
    }
    clamp_values(&mut values, config.clamp_midi_low, config.clamp_midi_high);
    let mut values = despike(&values, config.despike_semitones);
    ema(&mut values, config.ema_alpha, config.ema_reset_semitones);

    log::debug!(
        "user curve: {} points, {} voiced ({} raw)",
        values.len(),
        values.iter().flatten().count(),
        raw.iter().flatten().count()
    );

    UserCurve {
        beat_step: step,
        first_index,
        values,
    }
}

/// Pairs the reference samples with the processed user curve.
pub fn compare_curve(
    reference: &ReferenceSamples,
    user: &UserCurve,
    tolerance_semitones: f64,
) -> PitchCurve {
    let mut comparable = 0;
    let mut correct = 0;
    let points = reference
        .points
        .iter()
        .map(|p| {
            let user_midi = user.value_at(p.beat);
            let incorrect = match (p.midi, user_midi) {
                (Some(r), Some(u)) => {
                    comparable += 1;
                    let wrong = is_pitch_error(u - r, tolerance_semitones);
                    if !wrong {
                        correct += 1;
                    }
                    wrong
                }
                _ => false,
            };
            CurvePoint {
                beat: p.beat,
                reference_midi: p.midi,
                user_midi,
                incorrect,
            }
        })
        .collect();

    PitchCurve {
        beat_step: reference.beat_step,
        points,
        comparable,
        correct,
    }
}

pub fn pitch_score(curve: &PitchCurve) -> u8 {
    if curve.comparable == 0 {
        return 0;
    }
    (100.0 * curve.correct as f64 / curve.comparable as f64).round() as u8
}
