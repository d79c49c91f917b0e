use serde::Serialize;

use crate::pitch::units::freq_to_midi;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PitchResult {
    pub hz: f32,
    /// YIN clarity, `1 - cmnd(tau)`.
    pub clarity: f32,
    pub midi_float: f32,
}

impl PitchResult {
    pub fn silence() -> Self {
        PitchResult {
            hz: 0.0,
            clarity: 0.0,
            midi_float: 0.0,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.hz > 0.0
    }
}

/// YIN fundamental-frequency estimator over a bounded lag range.
///
/// The difference and CMND buffers are kept between calls so that tracking a
/// long recording does not allocate per frame.
pub struct PitchDetector {
    sample_rate: f32,
    min_freq: f32,
    max_freq: f32,
    threshold: f32,
    diff: Vec<f32>,
    cmnd: Vec<f32>,
}

impl PitchDetector {
    pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32, threshold: f32) -> Self {
        PitchDetector {
            sample_rate: sample_rate as f32,
            min_freq,
            max_freq,
            threshold,
            diff: Vec::new(),
            cmnd: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Estimates the fundamental of one frame. Frames with no clear
    /// periodicity in range come back as [`PitchResult::silence`].
    pub fn detect(&mut self, samples: &[f32]) -> PitchResult {
        if samples.len() < 4 || self.sample_rate <= 0.0 {
            return PitchResult::silence();
        }
        if samples.iter().all(|&s| s == 0.0) {
            return PitchResult::silence();
        }

        let min_lag = (self.sample_rate / self.max_freq).ceil().max(1.0) as usize;
        let max_lag = (self.sample_rate / self.min_freq).floor() as usize;

        let half_len = samples.len() / 2;
        let max_lag = max_lag.min(half_len);

        if min_lag >= max_lag || max_lag < 2 {
            return PitchResult::silence();
        }

        self.diff.clear();
        self.diff.resize(max_lag + 1, 0.0);
        for tau in 1..=max_lag {
            let mut sum = 0.0f32;
            for j in 0..half_len {
                let d = samples[j] - samples[j + tau];
                sum += d * d;
            }
            self.diff[tau] = sum;
        }

        self.cmnd.clear();
        self.cmnd.resize(max_lag + 1, 1.0);
        let mut running_sum = 0.0f32;
        for tau in 1..=max_lag {
            running_sum += self.diff[tau];
            self.cmnd[tau] = if running_sum > 0.0 {
                self.diff[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
        let cmnd = &self.cmnd;

        // First dip under the threshold, walked down to the bottom of its valley.
        let mut best_tau = 0usize;
        for tau in min_lag..=max_lag {
            if cmnd[tau] < self.threshold {
                let mut t = tau;
                while t < max_lag && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                best_tau = t;
                break;
            }
        }

        if best_tau == 0 {
            let mut min_val = f32::MAX;
            for (tau, &v) in cmnd.iter().enumerate().take(max_lag + 1).skip(min_lag) {
                if v < min_val {
                    min_val = v;
                    best_tau = tau;
                }
            }
            if min_val > 0.5 {
                return PitchResult::silence();
            }
        }

        let tau_refined = if best_tau > 0 && best_tau < max_lag {
            let alpha = cmnd[best_tau - 1];
            let beta = cmnd[best_tau];
            let gamma = cmnd[best_tau + 1];
            let denom = 2.0 * (alpha - 2.0 * beta + gamma);
            if denom.abs() > 1e-10 {
                best_tau as f32 + (alpha - gamma) / denom
            } else {
                best_tau as f32
            }
        } else {
            best_tau as f32
        };

        if tau_refined <= 0.0 {
            return PitchResult::silence();
        }

        let hz = self.sample_rate / tau_refined;
        let Some(midi) = freq_to_midi(hz as f64) else {
            return PitchResult::silence();
        };

        PitchResult {
            hz,
            clarity: 1.0 - cmnd[best_tau].min(1.0),
            midi_float: midi as f32,
        }
    }
}
