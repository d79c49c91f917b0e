const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Continuous MIDI number for a frequency, or `None` for anything that is not
/// a positive finite frequency.
pub fn freq_to_midi(freq_hz: f64) -> Option<f64> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return None;
    }
    Some(69.0 + 12.0 * (freq_hz / 440.0).log2())
}

pub fn midi_to_freq(midi: f64) -> f64 {
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

/// Nearest note name with octave, e.g. `C4`, `F#3`.
pub fn midi_to_note_name(midi: f64) -> String {
    let rounded = midi.round() as i32;
    let name = NOTE_NAMES[rounded.rem_euclid(12) as usize];
    let octave = rounded.div_euclid(12) - 1;
    format!("{}{}", name, octave)
}

/// Moves `user` by whole octaves (at most `range` either way) to the
/// candidate closest to `reference`. Ties keep the smaller shift.
pub fn octave_correct(user: f64, reference: f64, range: i32) -> f64 {
    let mut best = user;
    let mut best_diff = (user - reference).abs();
    for k in -range..=range {
        let candidate = user + 12.0 * k as f64;
        let diff = (candidate - reference).abs();
        if diff < best_diff {
            best_diff = diff;
            best = candidate;
        }
    }
    best
}
