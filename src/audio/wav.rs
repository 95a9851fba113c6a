//! In-memory WAV encoding for captured samples

use std::io::Cursor;

use cpal::FromSample;
use hound::{WavSpec, WavWriter};

use super::capture::AudioError;

/// Encode interleaved 16-bit samples as a complete WAV file.
pub fn encode_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::EncodeFailed(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| AudioError::EncodeFailed(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::EncodeFailed(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Convert any sample type to i16 for WAV writing.
pub fn sample_to_i16<T>(sample: T) -> i16
where
    T: cpal::Sample,
    f32: FromSample<T>,
{
    let f32_sample = f32::from_sample_(sample);
    // Clamp and convert to i16
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
