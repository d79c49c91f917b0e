use serde::Serialize;

use crate::reference::types::ReferenceMelody;

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct ReferencePoint {
    pub beat: f64,
    pub midi: Option<f64>,
}

/// The reference melody resampled on a fixed beat grid covering
/// `[0, total_beats]`.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ReferenceSamples {
    pub beat_step: f64,
    pub total_beats: f64,
    pub points: Vec<ReferencePoint>,
}

/// Number of grid points `k * step` with `k * step <= end`.
pub(crate) fn grid_len(end: f64, step: f64) -> usize {
    if step <= 0.0 || !end.is_finite() || end < 0.0 {
        return 1;
    }
    (end / step + 1e-9).floor() as usize + 1
}

pub fn normalize_reference(melody: &ReferenceMelody, beat_step: f64) -> ReferenceSamples {
    let total_beats = melody.total_beats();
    let points = (0..grid_len(total_beats, beat_step))
        .map(|k| {
            let beat = k as f64 * beat_step;
            ReferencePoint {
                beat,
                midi: melody.note_at(beat).map(|n| n.midi),
            }
        })
        .collect();
    ReferenceSamples {
        beat_step,
        total_beats,
        points,
    }
}
