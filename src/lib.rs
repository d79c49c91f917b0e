use wasm_bindgen::prelude::*;

pub mod alignment;
pub mod audio;
pub mod config;
pub mod error;
pub mod parser;
pub mod pitch;
pub mod progress;
pub mod reference;
pub mod scoring;
pub mod session;

pub use audio::{decode_wav, RawAudio};
pub use config::{parse_config_json, validate_config, AnalysisConfig, ConfigValidationIssue};
pub use error::{AnalysisError, Result};
pub use progress::{NoopProgress, ProgressEvent, ProgressSink, ProgressStage};
pub use reference::{FallbackPolicy, ReferenceMelody, ReferenceSource};
pub use scoring::{AnalysisResult, NoteComparison, Verdict};
pub use session::{AnalysisReport, AnalysisSession};

use serde::Serialize;
use std::cell::RefCell;

thread_local! {
    static DETECTOR: RefCell<Option<pitch::PitchDetector>> = RefCell::new(None);
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize>(value: &T) -> std::result::Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_error)
}

fn config_from_js(config_json: Option<String>) -> std::result::Result<AnalysisConfig, JsValue> {
    parse_config_json(config_json.as_deref()).map_err(|issue| {
        serde_wasm_bindgen::to_value(&issue).unwrap_or_else(|_| js_error(&issue))
    })
}

struct JsProgressSink {
    cb: js_sys::Function,
}

impl ProgressSink for JsProgressSink {
    fn on_progress(&mut self, event: ProgressEvent) {
        let _ = self.cb.call2(
            &JsValue::NULL,
            &JsValue::from(event.stage as u32),
            &JsValue::from_f64(event.progress as f64),
        );
    }
}

/// What the browser gets back from an analysis: the export report plus the
/// curve the chart draws.
#[derive(Serialize)]
struct RecordingAnalysis {
    report: AnalysisReport,
    pitch_curve: scoring::PitchCurve,
    /// Set when the requested reference was unusable and the demo melody
    /// was scored instead.
    reference_fallback: Option<String>,
}

fn analyze(
    raw: &RawAudio,
    reference: JsValue,
    manual_offset: f64,
    config_json: Option<String>,
    progress: Option<js_sys::Function>,
) -> std::result::Result<JsValue, JsValue> {
    let config = config_from_js(config_json)?;
    let source: ReferenceSource = serde_wasm_bindgen::from_value(reference).map_err(js_error)?;
    let resolved =
        reference::resolve_reference(&source, FallbackPolicy::DemoMelody).map_err(js_error)?;
    let reference_fallback = resolved.fallback_reason.clone();

    let session = match progress {
        Some(cb) => AnalysisSession::run(
            raw,
            resolved.melody,
            manual_offset,
            &config,
            &mut JsProgressSink { cb },
        ),
        None => AnalysisSession::run(raw, resolved.melody, manual_offset, &config, &mut NoopProgress),
    }
    .map_err(js_error)?;

    to_js(&RecordingAnalysis {
        report: session.report(),
        pitch_curve: session.pitch_curve.clone(),
        reference_fallback,
    })
}

#[wasm_bindgen]
pub fn parse_reference_musicxml(xml: &str) -> std::result::Result<JsValue, JsValue> {
    let melody = parser::parse_musicxml(xml).map_err(js_error)?;
    to_js(&melody)
}

#[wasm_bindgen]
pub fn builtin_songs() -> std::result::Result<JsValue, JsValue> {
    to_js(&reference::builtin_songs())
}

#[wasm_bindgen]
pub fn load_builtin_reference(id: &str) -> std::result::Result<JsValue, JsValue> {
    let melody = reference::builtin_reference(id).map_err(js_error)?;
    to_js(&melody)
}

#[wasm_bindgen]
pub fn default_config_json() -> std::result::Result<String, JsValue> {
    serde_json::to_string_pretty(&AnalysisConfig::default()).map_err(js_error)
}

/// `null` when the config is usable, otherwise `{ path, message }`.
#[wasm_bindgen]
pub fn validate_config_json(config_json: Option<String>) -> JsValue {
    match config_from_js(config_json) {
        Ok(_) => JsValue::NULL,
        Err(issue) => issue,
    }
}

/// Single-buffer pitch estimate for a live meter, returning
/// Float64Array [hz, clarity, midi_float]. The detector is kept per thread
/// and rebuilt when the sample rate changes.
#[wasm_bindgen]
pub fn detect_pitch(samples: &[f32], sample_rate: u32) -> js_sys::Float64Array {
    let config = AnalysisConfig::default().pitch;
    let result = DETECTOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.as_ref().map(|d| d.sample_rate()) != Some(sample_rate as f32) {
            *slot = Some(pitch::PitchDetector::new(
                sample_rate,
                config.min_frequency_hz,
                config.max_frequency_hz,
                config.yin_threshold,
            ));
        }
        slot.as_mut()
            .map_or_else(pitch::PitchResult::silence, |d| d.detect(samples))
    });

    let arr = js_sys::Float64Array::new_with_length(3);
    arr.set_index(0, result.hz as f64);
    arr.set_index(1, result.clarity as f64);
    arr.set_index(2, result.midi_float as f64);
    arr
}

/// Pitch track of a mono recording, for previews before a full analysis.
#[wasm_bindgen]
pub fn track_pitch(
    samples: &[f32],
    sample_rate: u32,
    config_json: Option<String>,
) -> std::result::Result<JsValue, JsValue> {
    let config = config_from_js(config_json)?;
    let raw = RawAudio::mono(samples.to_vec(), sample_rate);
    raw.validate().map_err(js_error)?;
    let audio = audio::preprocess(&raw, &config.preprocess);
    let track = pitch::track_pitch(&audio, &config.pitch, &mut NoopProgress);
    to_js(&track)
}

/// Scores interleaved PCM against a reference given as
/// `{ kind: "built_in" | "music_xml" | "melody", value }`.
#[wasm_bindgen]
pub fn analyze_recording(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    reference: JsValue,
    manual_offset: f64,
    config_json: Option<String>,
    progress: Option<js_sys::Function>,
) -> std::result::Result<JsValue, JsValue> {
    let raw = RawAudio::from_interleaved(samples, channels, sample_rate).map_err(js_error)?;
    analyze(&raw, reference, manual_offset, config_json, progress)
}

#[wasm_bindgen]
pub fn analyze_wav(
    wav_bytes: &[u8],
    reference: JsValue,
    manual_offset: f64,
    config_json: Option<String>,
    progress: Option<js_sys::Function>,
) -> std::result::Result<JsValue, JsValue> {
    let raw = decode_wav(wav_bytes).map_err(js_error)?;
    analyze(&raw, reference, manual_offset, config_json, progress)
}
