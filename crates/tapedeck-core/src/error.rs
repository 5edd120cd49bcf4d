//! Error types for tapedeck-core.

use thiserror::Error;

/// Error type for tapedeck-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid punch window: start={start}, end={end}")]
    InvalidPunchWindow { start: u64, end: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
