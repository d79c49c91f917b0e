pub mod onset;
pub mod track;
pub mod units;
pub mod yin;

pub use onset::detect_onsets;
pub use track::{track_pitch, PitchTrack};
pub use units::{freq_to_midi, midi_to_freq, midi_to_note_name, octave_correct};
pub use yin::{PitchDetector, PitchResult};
