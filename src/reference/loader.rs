use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::parser::parse_musicxml;
use crate::reference::builtin::{builtin_reference, demo_melody};
use crate::reference::types::ReferenceMelody;

/// Where a reference melody comes from.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReferenceSource {
    BuiltIn(String),
    MusicXml(String),
    Melody(ReferenceMelody),
}

/// What to do when an external reference cannot be used.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    Strict,
    /// Substitute the fixed demo melody.
    DemoMelody,
}

#[derive(Serialize, Clone, Debug)]
pub struct ResolvedReference {
    pub melody: ReferenceMelody,
    /// Set when the demo melody replaced the requested reference.
    pub fallback_reason: Option<String>,
}

impl ResolvedReference {
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

fn check_usable(melody: ReferenceMelody) -> Result<ReferenceMelody> {
    if melody.notes.is_empty() {
        return Err(AnalysisError::ReferenceParse(
            "reference contains no pitched notes".to_string(),
        ));
    }
    melody.validate().map_err(AnalysisError::ReferenceParse)?;
    Ok(melody)
}

fn load(source: &ReferenceSource) -> Result<ReferenceMelody> {
    match source {
        ReferenceSource::BuiltIn(id) => builtin_reference(id),
        ReferenceSource::MusicXml(xml) => parse_musicxml(xml).and_then(check_usable),
        ReferenceSource::Melody(melody) => check_usable(melody.clone()),
    }
}

/// Loads the reference, applying `policy` to parse and content failures.
///
/// An unknown built-in id is always an error: it names a song the caller
/// asked for, not malformed data.
pub fn resolve_reference(
    source: &ReferenceSource,
    policy: FallbackPolicy,
) -> Result<ResolvedReference> {
    match (load(source), policy) {
        (Ok(melody), _) => Ok(ResolvedReference {
            melody,
            fallback_reason: None,
        }),
        (Err(e @ AnalysisError::UnknownSong(_)), _) | (Err(e), FallbackPolicy::Strict) => Err(e),
        (Err(e), FallbackPolicy::DemoMelody) => {
            log::warn!("reference unusable ({}), falling back to demo melody", e);
            Ok(ResolvedReference {
                melody: demo_melody(),
                fallback_reason: Some(e.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolves_without_fallback() {
        let r = resolve_reference(
            &ReferenceSource::BuiltIn("twinkle".to_string()),
            FallbackPolicy::DemoMelody,
        )
        .unwrap();
        assert!(!r.used_fallback());
        assert_eq!(r.melody.total_beats(), 40.0);
    }

    #[test]
    fn test_unknown_song_is_never_substituted() {
        for policy in [FallbackPolicy::Strict, FallbackPolicy::DemoMelody] {
            let err = resolve_reference(&ReferenceSource::BuiltIn("nope".to_string()), policy)
                .unwrap_err();
            assert!(matches!(err, AnalysisError::UnknownSong(_)));
        }
    }

    #[test]
    fn test_bad_xml_strict_vs_fallback() {
        let source = ReferenceSource::MusicXml("<score-partwise><oops></score-partwise>".to_string());

        let err = resolve_reference(&source, FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, AnalysisError::ReferenceParse(_)));

        let r = resolve_reference(&source, FallbackPolicy::DemoMelody).unwrap();
        assert!(r.used_fallback());
        assert_eq!(r.melody, demo_melody());
        assert!(r
            .fallback_reason
            .as_deref()
            .is_some_and(|s| s.starts_with("reference parse error")));
    }

    #[test]
    fn test_unbounded_note_falls_back() {
        let xml = r#"<score-partwise><part id="P1"><measure number="1">
            <note><pitch><step>C</step><octave>4</octave></pitch><duration>inf</duration></note>
        </measure></part></score-partwise>"#;
        let source = ReferenceSource::MusicXml(xml.to_string());
        let err = resolve_reference(&source, FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, AnalysisError::ReferenceParse(_)), "{:?}", err);

        let r = resolve_reference(&source, FallbackPolicy::DemoMelody).unwrap();
        assert!(r.used_fallback());
        assert_eq!(r.melody, demo_melody());

        let far = ReferenceMelody {
            notes: vec![crate::reference::types::Note::new(1e12, 1.0, 60.0)],
            ..demo_melody()
        };
        let r = resolve_reference(&ReferenceSource::Melody(far), FallbackPolicy::DemoMelody)
            .unwrap();
        assert!(r.used_fallback());
    }

    #[test]
    fn test_empty_score_falls_back() {
        let source = ReferenceSource::MusicXml("<score-partwise/>".to_string());
        assert!(resolve_reference(&source, FallbackPolicy::Strict).is_err());
        let r = resolve_reference(&source, FallbackPolicy::DemoMelody).unwrap();
        assert_eq!(r.melody.notes.len(), 3);
    }

    #[test]
    fn test_source_json_shape() {
        let s: ReferenceSource =
            serde_json::from_str(r#"{"kind":"built_in","value":"twinkle"}"#).unwrap();
        assert!(matches!(s, ReferenceSource::BuiltIn(ref id) if id == "twinkle"));
        let p: FallbackPolicy = serde_json::from_str(r#""demo_melody""#).unwrap();
        assert_eq!(p, FallbackPolicy::DemoMelody);
    }
}
