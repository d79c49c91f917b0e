pub mod builtin;
pub mod loader;
pub mod normalize;
pub mod types;

pub use builtin::{builtin_reference, builtin_songs, demo_melody, SongInfo};
pub use loader::{resolve_reference, FallbackPolicy, ReferenceSource, ResolvedReference};
pub use normalize::{normalize_reference, ReferencePoint, ReferenceSamples};
pub use types::{LyricEvent, Note, ReferenceMelody, TimeSignature, MAX_REFERENCE_BEATS};
