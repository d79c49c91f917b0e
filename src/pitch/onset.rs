use crate::config::OnsetConfig;
use crate::pitch::track::PitchTrack;

/// Frames where the RMS rise is a local peak above the threshold.
fn energy_onsets(track: &PitchTrack, threshold: f32) -> Vec<f64> {
    let rms = &track.rms;
    if rms.len() < 2 {
        return Vec::new();
    }
    let diff: Vec<f32> = std::iter::once(0.0)
        .chain(rms.windows(2).map(|w| w[1] - w[0]))
        .collect();

    let mut out = Vec::new();
    for i in 1..diff.len() {
        let d = diff[i];
        if d <= threshold {
            continue;
        }
        let prev = diff[i - 1];
        let next = diff.get(i + 1).copied().unwrap_or(f32::NEG_INFINITY);
        if d >= prev && d >= next {
            out.push(track.times[i]);
        }
    }
    out
}

/// Voicing starts and pitch jumps relative to the last voiced frame.
fn pitch_onsets(track: &PitchTrack, jump_semitones: f64) -> Vec<f64> {
    let mut out = Vec::new();
    let mut last_midi: Option<f64> = None;
    let mut prev_voiced = false;
    for i in 0..track.len() {
        match track.midi_at(i) {
            Some(midi) => {
                let jumped = last_midi.is_some_and(|m| (midi - m).abs() > jump_semitones);
                if !prev_voiced || jumped {
                    out.push(track.times[i]);
                }
                last_midi = Some(midi);
                prev_voiced = true;
            }
            None => prev_voiced = false,
        }
    }
    out
}

/// Keeps candidates in time order, dropping any closer than `min_gap` to the
/// last accepted one.
pub fn dedup_onsets(mut candidates: Vec<f64>, min_gap: f64) -> Vec<f64> {
    candidates.retain(|t| t.is_finite());
    candidates.sort_by(f64::total_cmp);
    let mut out: Vec<f64> = Vec::with_capacity(candidates.len());
    for t in candidates {
        match out.last() {
            Some(&last) if t - last < min_gap => {}
            _ => out.push(t),
        }
    }
    out
}

/// Note and syllable boundaries in seconds, strictly increasing and at least
/// `min_gap_seconds` apart.
pub fn detect_onsets(track: &PitchTrack, config: &OnsetConfig) -> Vec<f64> {
    let mut candidates = energy_onsets(track, config.energy_threshold);
    let energy_count = candidates.len();
    candidates.extend(pitch_onsets(track, config.pitch_jump_semitones));
    let pitch_count = candidates.len() - energy_count;

    let onsets = dedup_onsets(candidates, config.min_gap_seconds);
    log::debug!(
        "onsets: {} energy + {} pitch candidates -> {} kept",
        energy_count,
        pitch_count,
        onsets.len()
    );
    onsets
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Track at 100 frames/s built from per-frame (f0, rms) pairs.
    fn track(frames: &[(f32, f32)]) -> PitchTrack {
        let mut t = PitchTrack::empty(16_000, 320, 160);
        for (i, &(f0, rms)) in frames.iter().enumerate() {
            t.times.push(0.01 * i as f64);
            t.f0.push(f0);
            t.rms.push(rms);
            t.confidence.push((rms / 0.1).min(1.0));
        }
        t
    }

    #[test]
    fn test_voicing_start_is_onset() {
        let mut frames = vec![(0.0, 0.0); 10];
        frames.extend(vec![(261.63, 0.01); 20]);
        let onsets = detect_onsets(&track(&frames), &OnsetConfig::default());
        assert_eq!(onsets.len(), 1);
        assert!((onsets[0] - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_first_voiced_frame_counts() {
        let frames = vec![(220.0, 0.3); 20];
        let onsets = detect_onsets(&track(&frames), &OnsetConfig::default());
        assert_eq!(onsets, vec![0.0]);
    }

    #[test]
    fn test_pitch_jump_without_gap() {
        let mut frames = vec![(261.63, 0.3); 30];
        // up a fifth at frame 30, legato
        frames.extend(vec![(392.0, 0.3); 30]);
        let onsets = detect_onsets(&track(&frames), &OnsetConfig::default());
        assert_eq!(onsets.len(), 2);
        assert!((onsets[1] - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_small_drift_is_not_onset() {
        let frames: Vec<(f32, f32)> = (0..50)
            .map(|i| (261.63 * (1.0 + 0.0005 * i as f32), 0.3))
            .collect();
        let onsets = detect_onsets(&track(&frames), &OnsetConfig::default());
        assert_eq!(onsets, vec![0.0]);
    }

    #[test]
    fn test_energy_peak_detected_in_unvoiced_region() {
        let mut frames = vec![(0.0, 0.0); 10];
        frames.push((0.0, 0.1));
        frames.push((0.0, 0.3));
        frames.extend(vec![(0.0, 0.3); 10]);
        let onsets = detect_onsets(&track(&frames), &OnsetConfig::default());
        assert_eq!(onsets.len(), 1);
        assert!((onsets[0] - 0.11).abs() < 1e-9, "onset at {}", onsets[0]);
    }

    #[test]
    fn test_dedup_respects_min_gap() {
        let raw = vec![0.5, 0.0, 0.05, 0.081, 0.2, 0.21, 0.5, f64::NAN, 0.29];
        let out = dedup_onsets(raw, 0.08);
        assert_eq!(out, vec![0.0, 0.081, 0.2, 0.29, 0.5]);
    }

    #[test]
    fn test_onset_gap_holds_on_noisy_track() {
        // deterministic pseudo-random voicing and levels
        let mut state = 12345u32;
        let frames: Vec<(f32, f32)> = (0..500)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let r = (state >> 16) as f32 / 65_535.0;
                let f0 = if r > 0.4 { 100.0 + 400.0 * r } else { 0.0 };
                (f0, r * 0.5)
            })
            .collect();
        let config = OnsetConfig::default();
        let onsets = detect_onsets(&track(&frames), &config);
        assert!(!onsets.is_empty());
        for w in onsets.windows(2) {
            assert!(
                w[1] - w[0] >= config.min_gap_seconds,
                "onsets {} and {} closer than min gap",
                w[0],
                w[1]
            );
        }
    }

    #[test]
    fn test_empty_track() {
        assert!(detect_onsets(&track(&[]), &OnsetConfig::default()).is_empty());
    }
}
