//! Audio backend trait and error types.

use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Failed to initialize audio device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// Failed to create audio stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),
    /// No audio device available
    #[error("no audio device available")]
    NoDevice,
}

/// Trait for audio backends that drive the engine from a device callback.
pub trait AudioBackend {
    /// Get the device sample rate.
    fn sample_rate(&self) -> u32;

    /// Start processing.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop processing. The engine is kept; the device outputs silence.
    fn stop(&mut self) -> Result<(), AudioError>;
}
