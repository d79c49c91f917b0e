use std::io::Cursor;

use crate::audio::preprocess::RawAudio;
use crate::error::{AnalysisError, Result};

/// Decodes an in-memory WAV file into per-channel float buffers.
pub fn decode_wav(bytes: &[u8]) -> Result<RawAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AnalysisError::Decode("wav declares zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AnalysisError::Decode(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    log::debug!(
        "decoded wav: sample_rate={}, channels={}, bits={}, frames={}",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        interleaved.len() / spec.channels as usize
    );

    RawAudio::from_interleaved(&interleaved, spec.channels, spec.sample_rate)
}
