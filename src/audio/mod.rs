pub mod decode;
pub mod filter;
pub mod preprocess;

pub use decode::decode_wav;
pub use preprocess::{downmix_to_mono, normalize_peak, preprocess, PreprocessedAudio, RawAudio};
