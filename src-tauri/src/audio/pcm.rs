use super::AudioError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::Duration;

/// Sample rate of the speech model's PCM output.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Decoded mono audio ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decodes base64 headerless 16-bit little-endian mono PCM at 24 kHz.
///
/// An odd trailing byte cannot form a sample and is dropped.
pub fn decode_pcm16(base64: &str) -> Result<AudioBuffer, AudioError> {
    let bytes = BASE64.decode(base64.trim())?;
    if bytes.len() % 2 != 0 {
        log::warn!(
            "PCM payload has odd length {}; dropping the trailing byte",
            bytes.len()
        );
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(AudioBuffer {
        sample_rate: SPEECH_SAMPLE_RATE,
        channels: 1,
        samples,
    })
}
