use thiserror::Error;

use crate::config::ConfigValidationIssue;

/// Failures that abort an analysis before the pipeline starts.
///
/// Degenerate recordings (silence, no comparable notes) are not errors; they
/// produce a zero-score result instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("audio too short: {duration_seconds:.2}s recorded, at least {min_seconds:.2}s required")]
    AudioTooShort {
        duration_seconds: f64,
        min_seconds: f64,
    },

    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("unknown song id: {0}")]
    UnknownSong(String),

    #[error("reference parse error: {0}")]
    ReferenceParse(String),

    #[error("invalid config: {0}")]
    Config(ConfigValidationIssue),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<hound::Error> for AnalysisError {
    fn from(e: hound::Error) -> Self {
        AnalysisError::Decode(e.to_string())
    }
}

impl From<ConfigValidationIssue> for AnalysisError {
    fn from(issue: ConfigValidationIssue) -> Self {
        AnalysisError::Config(issue)
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
