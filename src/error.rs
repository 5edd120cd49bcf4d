//! Centralized error type for the tapedeck umbrella crate.
//!
//! Wraps both member crates' errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tapedeck_core::Error),

    #[error("Stream: {0}")]
    Stream(#[from] tapedeck_stream::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
