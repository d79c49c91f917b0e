use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{AnalysisError, Result};
use crate::reference::types::{LyricEvent, Note, ReferenceMelody, TimeSignature};

const DEFAULT_TEMPO: f64 = 120.0;

pub fn midi_from_pitch(step: char, alter: i32, octave: i32) -> i32 {
    let base = match step.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => 0,
    };
    (octave + 1) * 12 + base + alter
}

fn parse_err(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::ReferenceParse(msg.into())
}

fn tempo_attr(e: &BytesStart) -> Option<f64> {
    let attr = e
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"tempo")?;
    let val = std::str::from_utf8(&attr.value).ok()?;
    val.trim().parse::<f64>().ok().filter(|t| *t > 0.0)
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Divisions,
    Duration,
    Step,
    Alter,
    Octave,
    PerMinute,
    Beats,
    BeatType,
    Title,
    LyricText,
}

#[derive(Default)]
struct NoteState {
    is_rest: bool,
    is_chord: bool,
    is_grace: bool,
    duration_divs: Option<f64>,
    step: Option<char>,
    alter: f64,
    octave: Option<i32>,
    lyric: Option<String>,
}

/// Reads the first part of a MusicXML score as a monophonic melody.
///
/// Rests advance time and are dropped, chord members after the first are
/// dropped, grace notes are ignored. `<backup>` and `<forward>` move the
/// cursor. The first verse of each note's lyrics is anchored to its start.
pub fn parse_musicxml(xml: &str) -> Result<ReferenceMelody> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    let mut divisions: f64 = 1.0;
    let mut tempo: Option<f64> = None;
    let mut time_signature = TimeSignature::default();
    let mut title: Option<String> = None;
    let mut notes: Vec<Note> = Vec::new();
    let mut lyrics: Vec<LyricEvent> = Vec::new();

    let mut current_beat: f64 = 0.0;
    let mut field: Option<Field> = None;

    let mut note: Option<NoteState> = None;
    let mut in_lyric = false;
    // <backup>/<forward> carry their own <duration>
    let mut cursor_move: Option<(f64, Option<f64>)> = None;
    let mut in_part = false;
    let mut part_done = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"part" => in_part = !part_done,
                b"note" if in_part => note = Some(NoteState::default()),
                b"rest" => {
                    if let Some(n) = note.as_mut() {
                        n.is_rest = true;
                    }
                }
                b"lyric" => {
                    in_lyric = note.as_ref().is_some_and(|n| n.lyric.is_none());
                }
                b"backup" if in_part => cursor_move = Some((-1.0, None)),
                b"forward" if in_part => cursor_move = Some((1.0, None)),
                b"divisions" => field = Some(Field::Divisions),
                b"duration" => field = Some(Field::Duration),
                b"step" => field = Some(Field::Step),
                b"alter" => field = Some(Field::Alter),
                b"octave" => field = Some(Field::Octave),
                b"per-minute" => field = Some(Field::PerMinute),
                b"beats" => field = Some(Field::Beats),
                b"beat-type" => field = Some(Field::BeatType),
                b"movement-title" | b"work-title" => field = Some(Field::Title),
                b"text" if in_lyric => field = Some(Field::LyricText),
                b"sound" => {
                    if let Some(t) = tempo_attr(e) {
                        tempo = Some(t);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"sound" => {
                    if let Some(t) = tempo_attr(e) {
                        tempo = Some(t);
                    }
                }
                b"rest" => {
                    if let Some(n) = note.as_mut() {
                        n.is_rest = true;
                    }
                }
                b"chord" => {
                    if let Some(n) = note.as_mut() {
                        n.is_chord = true;
                    }
                }
                b"grace" => {
                    if let Some(n) = note.as_mut() {
                        n.is_grace = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some(f) = field.take() {
                    let text = e.unescape().map_err(|e| parse_err(e.to_string()))?;
                    let text = text.trim();
                    match f {
                        Field::Divisions => {
                            if let Ok(v) = text.parse::<f64>() {
                                if v > 0.0 {
                                    divisions = v;
                                }
                            }
                        }
                        Field::Duration => {
                            let v = text.parse::<f64>().ok();
                            if let Some((_, d)) = cursor_move.as_mut() {
                                *d = v;
                            } else if let Some(n) = note.as_mut() {
                                n.duration_divs = v;
                            }
                        }
                        Field::Step => {
                            if let Some(n) = note.as_mut() {
                                n.step = text.chars().next();
                            }
                        }
                        Field::Alter => {
                            if let Some(n) = note.as_mut() {
                                n.alter = text.parse::<f64>().unwrap_or(0.0);
                            }
                        }
                        Field::Octave => {
                            if let Some(n) = note.as_mut() {
                                n.octave = text.parse::<i32>().ok();
                            }
                        }
                        Field::PerMinute => {
                            if tempo.is_none() {
                                tempo = text.parse::<f64>().ok().filter(|t| *t > 0.0);
                            }
                        }
                        Field::Beats => {
                            if let Ok(v) = text.parse::<u8>() {
                                time_signature.numerator = v;
                            }
                        }
                        Field::BeatType => {
                            if let Ok(v) = text.parse::<u8>() {
                                time_signature.denominator = v;
                            }
                        }
                        Field::Title => {
                            if title.is_none() && !text.is_empty() {
                                title = Some(text.to_string());
                            }
                        }
                        Field::LyricText => {
                            if let Some(n) = note.as_mut() {
                                n.lyric = Some(text.to_string());
                            }
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"note" => {
                    if let Some(n) = note.take() {
                        let duration_beats = n.duration_divs.unwrap_or(0.0) / divisions;
                        if n.is_grace || n.is_chord || duration_beats <= 0.0 {
                            // no time advance
                        } else if n.is_rest {
                            current_beat += duration_beats;
                        } else {
                            let s = n.step.ok_or_else(|| parse_err("missing pitch step"))?;
                            let o = n.octave.ok_or_else(|| parse_err("missing pitch octave"))?;
                            let midi = midi_from_pitch(s, 0, o) as f64 + n.alter;
                            notes.push(Note::new(current_beat, duration_beats, midi));
                            if let Some(text) = n.lyric {
                                lyrics.push(LyricEvent {
                                    beat: current_beat,
                                    text,
                                });
                            }
                            current_beat += duration_beats;
                        }
                    }
                    in_lyric = false;
                }
                b"lyric" => in_lyric = false,
                b"backup" | b"forward" => {
                    if let Some((sign, Some(d))) = cursor_move.take() {
                        current_beat = (current_beat + sign * d / divisions).max(0.0);
                    }
                }
                b"part" => {
                    if in_part {
                        part_done = true;
                    }
                    in_part = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(parse_err(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    notes.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));

    log::debug!(
        "musicxml: {} notes, {} lyric events, tempo {:?}",
        notes.len(),
        lyrics.len(),
        tempo
    );

    Ok(ReferenceMelody {
        title: title.unwrap_or_else(|| "Untitled".to_string()),
        tempo_bpm: tempo.unwrap_or(DEFAULT_TEMPO),
        time_signature,
        notes,
        lyrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(measures: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <work><work-title>Little Tune</work-title></work>
  <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>
  <part id="P1">{}</part>
</score-partwise>"#,
            measures
        )
    }

    #[test]
    fn test_midi_from_pitch() {
        assert_eq!(midi_from_pitch('C', 0, 4), 60);
        assert_eq!(midi_from_pitch('A', 0, 4), 69);
        assert_eq!(midi_from_pitch('C', 1, 4), 61);
        assert_eq!(midi_from_pitch('B', -1, 4), 70);
        assert_eq!(midi_from_pitch('g', 0, 3), 55);
    }

    #[test]
    fn test_parse_melody_with_rest_and_lyrics() {
        let xml = wrap(
            r#"
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <time><beats>3</beats><beat-type>4</beat-type></time>
      </attributes>
      <direction>
        <direction-type><metronome><beat-unit>quarter</beat-unit><per-minute>90</per-minute></metronome></direction-type>
      </direction>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>2</duration>
        <lyric number="1"><syllabic>begin</syllabic><text>Hel</text></lyric>
        <lyric number="2"><text>Second</text></lyric>
      </note>
      <note>
        <rest/>
        <duration>1</duration>
      </note>
      <note>
        <pitch><step>F</step><alter>1</alter><octave>4</octave></pitch>
        <duration>3</duration>
        <lyric number="1"><syllabic>end</syllabic><text>lo</text></lyric>
      </note>
    </measure>"#,
        );

        let m = parse_musicxml(&xml).unwrap();
        assert_eq!(m.title, "Little Tune");
        assert_eq!(m.tempo_bpm, 90.0);
        assert_eq!(m.time_signature.numerator, 3);
        assert_eq!(m.notes, vec![Note::new(0.0, 1.0, 60.0), Note::new(1.5, 1.5, 66.0)]);
        assert_eq!(m.total_beats(), 3.0);
        assert_eq!(m.lyrics.len(), 2);
        assert_eq!(m.lyrics[0].text, "Hel");
        assert_eq!(m.lyrics[1].beat, 1.5);
    }

    #[test]
    fn test_sound_tempo_wins_and_chords_are_dropped() {
        let xml = wrap(
            r#"
    <measure number="1">
      <attributes><divisions>1</divisions></attributes>
      <sound tempo="72"/>
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>1</duration></note>
      <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration></note>
      <note><grace/><pitch><step>D</step><octave>4</octave></pitch></note>
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration></note>
    </measure>"#,
        );
        let m = parse_musicxml(&xml).unwrap();
        assert_eq!(m.tempo_bpm, 72.0);
        assert_eq!(m.notes, vec![Note::new(0.0, 1.0, 64.0), Note::new(1.0, 1.0, 62.0)]);
    }

    #[test]
    fn test_backup_and_second_part_are_ignored_for_timing() {
        let xml = r#"<score-partwise>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions></attributes>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration></note>
      <backup><duration>2</duration></backup>
      <forward><duration>2</duration></forward>
      <note><pitch><step>D</step><octave>5</octave></pitch><duration>1</duration></note>
    </measure>
  </part>
  <part id="P2">
    <measure number="1">
      <note><pitch><step>C</step><octave>2</octave></pitch><duration>4</duration></note>
    </measure>
  </part>
</score-partwise>"#;
        let m = parse_musicxml(xml).unwrap();
        assert_eq!(m.title, "Untitled");
        assert_eq!(m.tempo_bpm, 120.0);
        assert_eq!(m.notes, vec![Note::new(0.0, 2.0, 72.0), Note::new(2.0, 1.0, 74.0)]);
    }

    #[test]
    fn test_missing_octave_is_error() {
        let xml = wrap(
            r#"<measure number="1"><note><pitch><step>C</step></pitch><duration>1</duration></note></measure>"#,
        );
        let err = parse_musicxml(&xml).unwrap_err();
        assert!(matches!(err, AnalysisError::ReferenceParse(_)));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let err = parse_musicxml("<score-partwise><part><measure></part>").unwrap_err();
        assert!(matches!(err, AnalysisError::ReferenceParse(_)), "{:?}", err);
    }
}
