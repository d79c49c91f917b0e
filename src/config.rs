use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Rumble / DC cut.
    pub highpass_hz: f32,
    /// Keeps the vocal fundamental and the first few harmonics.
    pub lowpass_hz: f32,
    pub filter_q: f32,
    pub target_peak: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            highpass_hz: 70.0,
            lowpass_hz: 2_000.0,
            filter_q: std::f32::consts::FRAC_1_SQRT_2,
            target_peak: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PitchConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub yin_threshold: f32,
    /// RMS level that maps to confidence 1.0.
    pub confidence_rms_ceiling: f32,
    /// Frames below this confidence are forced unvoiced.
    pub min_confidence: f32,
    pub yield_every_frames: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 256,
            min_frequency_hz: 65.0,
            max_frequency_hz: 1_000.0,
            yin_threshold: 0.15,
            confidence_rms_ceiling: 0.1,
            min_confidence: 0.2,
            yield_every_frames: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OnsetConfig {
    /// Minimum frame-to-frame RMS rise for an energy onset.
    pub energy_threshold: f32,
    pub pitch_jump_semitones: f64,
    pub min_gap_seconds: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.02,
            pitch_jump_semitones: 1.0,
            min_gap_seconds: 0.08,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignmentConfig {
    pub rms_window_seconds: f64,
    pub rms_hop_seconds: f64,
    pub baseline_seconds: f64,
    pub baseline_factor: f32,
    pub min_rms_threshold: f32,
    pub fine_step_seconds: f64,
    pub max_fine_shift_seconds: f64,
    pub max_manual_offset_seconds: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            rms_window_seconds: 0.02,
            rms_hop_seconds: 0.01,
            baseline_seconds: 2.0,
            baseline_factor: 0.6,
            min_rms_threshold: 0.02,
            fine_step_seconds: 0.01,
            max_fine_shift_seconds: 0.5,
            max_manual_offset_seconds: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    /// Grid step (in beats) of the reference and user pitch curves.
    pub beat_step: f64,
    pub pitch_tolerance_cents: f64,
    /// Base rhythm tolerance, a sixteenth note when the beat is a quarter.
    pub rhythm_tolerance_beats: f64,
    pub rhythm_leniency: f64,
    pub onset_match_tolerance_beats: f64,
    /// How far around a note's expected window its observed start is searched.
    pub timing_search_beats: f64,
    pub smoothing_window_frames: usize,
    pub ema_alpha: f64,
    /// Pitch change that restarts the EMA instead of being smoothed.
    pub ema_reset_semitones: f64,
    /// Central share of a note used for its pitch estimate.
    pub stable_region_fraction: f64,
    pub octave_search_range: i32,
    pub despike_semitones: f64,
    pub clamp_midi_low: f64,
    pub clamp_midi_high: f64,
    /// Share of the total score given to pitch; rhythm gets the rest.
    pub pitch_weight: f64,
    /// Descending total-score thresholds for the top three verdict tiers.
    pub verdict_thresholds: [u8; 3],
}

impl ScoringConfig {
    pub fn pitch_tolerance_semitones(&self) -> f64 {
        self.pitch_tolerance_cents / 100.0
    }

    pub fn effective_rhythm_tolerance_beats(&self) -> f64 {
        self.rhythm_tolerance_beats * self.rhythm_leniency
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            beat_step: 0.05,
            pitch_tolerance_cents: 50.0,
            rhythm_tolerance_beats: 0.25,
            rhythm_leniency: 1.0,
            onset_match_tolerance_beats: 0.25,
            timing_search_beats: 0.5,
            smoothing_window_frames: 9,
            ema_alpha: 0.2,
            ema_reset_semitones: 1.0,
            stable_region_fraction: 0.6,
            octave_search_range: 2,
            despike_semitones: 8.0,
            clamp_midi_low: 36.0,
            clamp_midi_high: 77.0,
            pitch_weight: 0.6,
            verdict_thresholds: [90, 75, 60],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub preprocess: PreprocessConfig,
    pub pitch: PitchConfig,
    pub onset: OnsetConfig,
    pub alignment: AlignmentConfig,
    pub scoring: ScoringConfig,
    pub min_duration_seconds: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            pitch: PitchConfig::default(),
            onset: OnsetConfig::default(),
            alignment: AlignmentConfig::default(),
            scoring: ScoringConfig::default(),
            min_duration_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValidationIssue {
    pub path: String,
    pub message: String,
}

impl ConfigValidationIssue {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn positive_f32(path: &str, value: f32) -> Result<(), ConfigValidationIssue> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigValidationIssue::new(path, "must be > 0"));
    }
    Ok(())
}

fn positive_f64(path: &str, value: f64) -> Result<(), ConfigValidationIssue> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigValidationIssue::new(path, "must be > 0"));
    }
    Ok(())
}

fn unit_interval(path: &str, value: f64) -> Result<(), ConfigValidationIssue> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigValidationIssue::new(path, "must be in [0, 1]"));
    }
    Ok(())
}

pub fn validate_config(config: &AnalysisConfig) -> Result<(), ConfigValidationIssue> {
    let pre = &config.preprocess;
    positive_f32("preprocess.highpass_hz", pre.highpass_hz)?;
    positive_f32("preprocess.lowpass_hz", pre.lowpass_hz)?;
    if pre.lowpass_hz <= pre.highpass_hz {
        return Err(ConfigValidationIssue::new(
            "preprocess.lowpass_hz",
            "must be > preprocess.highpass_hz",
        ));
    }
    positive_f32("preprocess.filter_q", pre.filter_q)?;
    if !pre.target_peak.is_finite() || pre.target_peak <= 0.0 || pre.target_peak > 1.0 {
        return Err(ConfigValidationIssue::new(
            "preprocess.target_peak",
            "must be in (0, 1]",
        ));
    }

    let pitch = &config.pitch;
    if pitch.frame_size < 4 {
        return Err(ConfigValidationIssue::new("pitch.frame_size", "must be >= 4"));
    }
    if pitch.hop_size == 0 {
        return Err(ConfigValidationIssue::new("pitch.hop_size", "must be > 0"));
    }
    if pitch.hop_size > pitch.frame_size {
        return Err(ConfigValidationIssue::new(
            "pitch.hop_size",
            "must be <= pitch.frame_size",
        ));
    }
    positive_f32("pitch.min_frequency_hz", pitch.min_frequency_hz)?;
    if !pitch.max_frequency_hz.is_finite() || pitch.max_frequency_hz <= pitch.min_frequency_hz {
        return Err(ConfigValidationIssue::new(
            "pitch.max_frequency_hz",
            "must be > pitch.min_frequency_hz",
        ));
    }
    unit_interval("pitch.yin_threshold", pitch.yin_threshold as f64)?;
    positive_f32("pitch.confidence_rms_ceiling", pitch.confidence_rms_ceiling)?;
    unit_interval("pitch.min_confidence", pitch.min_confidence as f64)?;
    if pitch.yield_every_frames == 0 {
        return Err(ConfigValidationIssue::new(
            "pitch.yield_every_frames",
            "must be > 0",
        ));
    }

    let onset = &config.onset;
    positive_f32("onset.energy_threshold", onset.energy_threshold)?;
    positive_f64("onset.pitch_jump_semitones", onset.pitch_jump_semitones)?;
    positive_f64("onset.min_gap_seconds", onset.min_gap_seconds)?;

    let align = &config.alignment;
    positive_f64("alignment.rms_window_seconds", align.rms_window_seconds)?;
    positive_f64("alignment.rms_hop_seconds", align.rms_hop_seconds)?;
    positive_f64("alignment.baseline_seconds", align.baseline_seconds)?;
    positive_f32("alignment.baseline_factor", align.baseline_factor)?;
    positive_f32("alignment.min_rms_threshold", align.min_rms_threshold)?;
    positive_f64("alignment.fine_step_seconds", align.fine_step_seconds)?;
    if !align.max_fine_shift_seconds.is_finite() || align.max_fine_shift_seconds < 0.0 {
        return Err(ConfigValidationIssue::new(
            "alignment.max_fine_shift_seconds",
            "must be >= 0",
        ));
    }
    if !align.max_manual_offset_seconds.is_finite() || align.max_manual_offset_seconds < 0.0 {
        return Err(ConfigValidationIssue::new(
            "alignment.max_manual_offset_seconds",
            "must be >= 0",
        ));
    }

    let scoring = &config.scoring;
    positive_f64("scoring.beat_step", scoring.beat_step)?;
    positive_f64("scoring.pitch_tolerance_cents", scoring.pitch_tolerance_cents)?;
    positive_f64("scoring.rhythm_tolerance_beats", scoring.rhythm_tolerance_beats)?;
    positive_f64("scoring.rhythm_leniency", scoring.rhythm_leniency)?;
    positive_f64(
        "scoring.onset_match_tolerance_beats",
        scoring.onset_match_tolerance_beats,
    )?;
    if !scoring.timing_search_beats.is_finite() || scoring.timing_search_beats < 0.0 {
        return Err(ConfigValidationIssue::new(
            "scoring.timing_search_beats",
            "must be >= 0",
        ));
    }
    if scoring.smoothing_window_frames == 0 {
        return Err(ConfigValidationIssue::new(
            "scoring.smoothing_window_frames",
            "must be > 0",
        ));
    }
    if !scoring.ema_alpha.is_finite() || scoring.ema_alpha <= 0.0 || scoring.ema_alpha > 1.0 {
        return Err(ConfigValidationIssue::new(
            "scoring.ema_alpha",
            "must be in (0, 1]",
        ));
    }
    positive_f64("scoring.ema_reset_semitones", scoring.ema_reset_semitones)?;
    if !scoring.stable_region_fraction.is_finite()
        || scoring.stable_region_fraction <= 0.0
        || scoring.stable_region_fraction > 1.0
    {
        return Err(ConfigValidationIssue::new(
            "scoring.stable_region_fraction",
            "must be in (0, 1]",
        ));
    }
    if scoring.octave_search_range < 0 {
        return Err(ConfigValidationIssue::new(
            "scoring.octave_search_range",
            "must be >= 0",
        ));
    }
    positive_f64("scoring.despike_semitones", scoring.despike_semitones)?;
    if !scoring.clamp_midi_low.is_finite()
        || !scoring.clamp_midi_high.is_finite()
        || scoring.clamp_midi_high <= scoring.clamp_midi_low
    {
        return Err(ConfigValidationIssue::new(
            "scoring.clamp_midi_high",
            "must be > scoring.clamp_midi_low",
        ));
    }
    unit_interval("scoring.pitch_weight", scoring.pitch_weight)?;
    let [top, mid, low] = scoring.verdict_thresholds;
    if top > 100 || !(top > mid && mid > low) {
        return Err(ConfigValidationIssue::new(
            "scoring.verdict_thresholds",
            "must be strictly decreasing and <= 100",
        ));
    }

    if !config.min_duration_seconds.is_finite() || config.min_duration_seconds < 0.0 {
        return Err(ConfigValidationIssue::new(
            "min_duration_seconds",
            "must be >= 0",
        ));
    }

    Ok(())
}

/// Parses an optional JSON config, falling back to defaults when absent or
/// blank, and validates the result.
pub fn parse_config_json(json: Option<&str>) -> Result<AnalysisConfig, ConfigValidationIssue> {
    let config = match json {
        Some(text) if !text.trim().is_empty() => {
            serde_json::from_str::<AnalysisConfig>(text)
                .map_err(|err| ConfigValidationIssue::new("config_json", err.to_string()))?
        }
        _ => AnalysisConfig::default(),
    };
    validate_config(&config)?;
    Ok(config)
}
