use crate::audio::filter::{Biquad, FilterKind};
use crate::config::PreprocessConfig;
use crate::error::{AnalysisError, Result};

/// Decoded multi-channel PCM as delivered by a decoder. Never mutated.
#[derive(Clone, Debug)]
pub struct RawAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl RawAudio {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Splits interleaved frames (`L R L R ...`) into channels. A trailing
    /// partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AnalysisError::InvalidInput(
                "channel count must be > 0".to_string(),
            ));
        }
        let n = channels as usize;
        let frames = samples.len() / n;
        let mut out = vec![Vec::with_capacity(frames); n];
        for frame in samples.chunks_exact(n) {
            for (ch, &s) in out.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Ok(Self {
            channels: out,
            sample_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AnalysisError::InvalidInput(
                "sample rate must be > 0".to_string(),
            ));
        }
        if self.channels.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "audio has no channels".to_string(),
            ));
        }
        let len = self.len();
        if let Some(idx) = self.channels.iter().position(|c| c.len() != len) {
            return Err(AnalysisError::InvalidInput(format!(
                "channel {} has {} samples, expected {}",
                idx,
                self.channels[idx].len(),
                len
            )));
        }
        Ok(())
    }
}

/// Mono, band-limited, peak-normalized signal at the source sample rate.
#[derive(Clone, Debug)]
pub struct PreprocessedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PreprocessedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub fn downmix_to_mono(channels: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = channels.first() else {
        return Vec::new();
    };
    if channels.len() == 1 {
        return first.clone();
    }
    let len = channels.iter().map(Vec::len).min().unwrap_or(0);
    let scale = 1.0 / channels.len() as f32;
    (0..len)
        .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
        .collect()
}

/// Scales the buffer so its largest absolute sample equals `target_peak`.
/// Silent buffers are left untouched.
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 && peak.is_finite() {
        let gain = target_peak / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}

pub fn preprocess(raw: &RawAudio, config: &PreprocessConfig) -> PreprocessedAudio {
    let mut samples = downmix_to_mono(&raw.channels);

    match Biquad::new(
        FilterKind::HighPass,
        config.highpass_hz,
        config.filter_q,
        raw.sample_rate,
    ) {
        Some(mut hp) => hp.process_in_place(&mut samples),
        None => log::warn!(
            "high-pass at {} Hz not applicable at {} Hz sample rate, skipped",
            config.highpass_hz,
            raw.sample_rate
        ),
    }
    match Biquad::new(
        FilterKind::LowPass,
        config.lowpass_hz,
        config.filter_q,
        raw.sample_rate,
    ) {
        Some(mut lp) => lp.process_in_place(&mut samples),
        None => log::debug!(
            "low-pass at {} Hz is above nyquist for {} Hz, skipped",
            config.lowpass_hz,
            raw.sample_rate
        ),
    }

    normalize_peak(&mut samples, config.target_peak);

    log::debug!(
        "preprocessed {} channel(s) -> {} mono samples at {} Hz",
        raw.channels.len(),
        samples.len(),
        raw.sample_rate
    );

    PreprocessedAudio {
        samples,
        sample_rate: raw.sample_rate,
    }
}
