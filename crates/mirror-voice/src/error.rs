//! Error types for the mirror voice pipeline

use thiserror::Error;

/// Result type alias for voice pipeline operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that can occur in the voice session pipeline
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Microphone permission denied or device unavailable. Fatal to session start.
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    /// Session open failure or mid-session disconnect. Fatal to the current session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Submitting to a session that has already been closed.
    #[error("Transport closed")]
    TransportClosed,

    /// Malformed audio payload. The single payload is dropped; the session continues.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for MirrorError {
    fn from(err: cpal::DevicesError) -> Self {
        MirrorError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for MirrorError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        MirrorError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for MirrorError {
    fn from(err: cpal::BuildStreamError) -> Self {
        MirrorError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for MirrorError {
    fn from(err: cpal::PlayStreamError) -> Self {
        MirrorError::AudioStream(err.to_string())
    }
}
