pub mod output;
pub mod pcm;

pub use output::AudioOutput;
pub use pcm::{decode_pcm16, AudioBuffer};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("playback worker unavailable: {0}")]
    Worker(String),
}
