pub mod analyzer;
pub mod curve;
pub mod feedback;
pub mod types;

pub use analyzer::{
    build_issues, compare_note, compare_notes, onset_beats, rhythm_score, summarize, total_score,
};
pub use curve::{build_user_curve, compare_curve, pitch_score, UserCurve};
pub use feedback::coaching_tips;
pub use types::{
    AnalysisResult, CurvePoint, IssueKind, NoteComparison, NoteIssue, PitchCurve, Verdict,
};
