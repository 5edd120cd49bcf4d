//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tapedeck_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV encode/decode error.
    #[cfg(feature = "wav")]
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// The disk thread could not be started.
    #[error("Failed to spawn disk thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// `start()` while a capture is in progress.
    #[error("Capture already in progress on {0}")]
    AlreadyRecording(String),

    /// `stop()` without a capture in progress.
    #[error("No capture in progress on {0}")]
    NotRecording(String),

    /// Persisting captured audio failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
