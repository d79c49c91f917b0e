use serde::Serialize;

use crate::audio::PreprocessedAudio;
use crate::config::PitchConfig;
use crate::pitch::units::freq_to_midi;
use crate::pitch::yin::PitchDetector;
use crate::progress::{emit, ProgressSink, ProgressStage};

/// Frame-wise pitch contour of a recording.
///
/// `times`, `f0`, `confidence` and `rms` always have the same length. An
/// `f0` of zero marks an unvoiced frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PitchTrack {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    /// Frame centres in seconds.
    pub times: Vec<f64>,
    pub f0: Vec<f32>,
    pub confidence: Vec<f32>,
    pub rms: Vec<f32>,
}

impl PitchTrack {
    pub fn empty(sample_rate: u32, frame_size: usize, hop_size: usize) -> Self {
        PitchTrack {
            sample_rate,
            frame_size,
            hop_size,
            times: Vec::new(),
            f0: Vec::new(),
            confidence: Vec::new(),
            rms: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn hop_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.hop_size as f64 / self.sample_rate as f64
    }

    pub fn is_voiced(&self, i: usize) -> bool {
        self.f0.get(i).is_some_and(|&f| f > 0.0)
    }

    /// Continuous MIDI pitch of frame `i`, `None` when unvoiced.
    pub fn midi_at(&self, i: usize) -> Option<f64> {
        self.f0.get(i).and_then(|&f| freq_to_midi(f as f64))
    }

    /// Index of the frame whose centre is nearest to `t`, or `None` when `t`
    /// falls outside the track.
    pub fn frame_at(&self, t: f64) -> Option<usize> {
        let first = *self.times.first()?;
        let hop = self.hop_seconds();
        if hop <= 0.0 || !t.is_finite() {
            return None;
        }
        let idx = ((t - first) / hop).round();
        if idx < 0.0 || idx >= self.len() as f64 {
            return None;
        }
        Some(idx as usize)
    }

    pub fn voiced_ratio(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let voiced = self.f0.iter().filter(|&&f| f > 0.0).count();
        voiced as f64 / self.len() as f64
    }
}

fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let energy: f32 = frame.iter().map(|s| s * s).sum();
    (energy / frame.len() as f32).sqrt()
}

/// Runs the YIN detector over frames centred on `i * hop`, with half a frame
/// of zero padding at both ends so the first frame sits at t = 0.
///
/// Estimates outside the configured singing range, or on frames whose
/// RMS-derived confidence is under `min_confidence`, are forced unvoiced.
pub fn track_pitch(
    audio: &PreprocessedAudio,
    config: &PitchConfig,
    progress: &mut dyn ProgressSink,
) -> PitchTrack {
    let frame = config.frame_size;
    let hop = config.hop_size;
    let sr = audio.sample_rate;
    let mut track = PitchTrack::empty(sr, frame, hop);

    if frame == 0 || hop == 0 || sr == 0 || audio.samples.len() < frame {
        log::debug!(
            "pitch tracking skipped: {} samples, frame {}",
            audio.samples.len(),
            frame
        );
        emit(progress, ProgressStage::PitchTracking, 1.0);
        return track;
    }

    let half = frame / 2;
    let mut padded = vec![0.0f32; audio.samples.len() + 2 * half];
    padded[half..half + audio.samples.len()].copy_from_slice(&audio.samples);
    let n_frames = (padded.len() - frame) / hop + 1;
    track.times.reserve(n_frames);
    track.f0.reserve(n_frames);
    track.confidence.reserve(n_frames);
    track.rms.reserve(n_frames);

    let mut detector = PitchDetector::new(
        sr,
        config.min_frequency_hz,
        config.max_frequency_hz,
        config.yin_threshold,
    );
    let yield_every = config.yield_every_frames.max(1);

    for i in 0..n_frames {
        let start = i * hop;
        let window = &padded[start..start + frame];

        let rms = frame_rms(window);
        let confidence = (rms / config.confidence_rms_ceiling).clamp(0.0, 1.0);

        let mut hz = 0.0f32;
        if confidence >= config.min_confidence {
            let result = detector.detect(window);
            if result.hz >= config.min_frequency_hz && result.hz <= config.max_frequency_hz {
                hz = result.hz;
            }
        }

        track.times.push(start as f64 / sr as f64);
        track.f0.push(hz);
        track.confidence.push(confidence);
        track.rms.push(rms);

        if (i + 1) % yield_every == 0 {
            emit(
                progress,
                ProgressStage::PitchTracking,
                (i + 1) as f32 / n_frames as f32,
            );
        }
    }
    emit(progress, ProgressStage::PitchTracking, 1.0);

    log::debug!(
        "pitch track: {} frames, hop {:.4}s, voiced ratio {:.2}",
        track.len(),
        track.hop_seconds(),
        track.voiced_ratio()
    );
    track
}
