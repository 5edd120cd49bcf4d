//! Collaborator contracts for the tapedeck disk-streaming engine.
//!
//! # Primary API
//!
//! - [`StreamConfig`] / [`StreamGeometry`]: buffering parameters and derived layout
//! - [`RtThread`] / [`DiskThread`]: thread-role tokens
//! - [`Transport`]: shared transport position and flags
//! - [`AudioPort`]: real-time port buffers
//! - [`SequenceSource`]: audio source for playback streams
//! - [`CaptureTrack`]: storage sink for capture streams
//! - [`TrackState`]: mute/solo switches read by the real-time thread
//!
//! Timeline structures shared between the UI and disk threads are wrapped in
//! a [`SharedTimeline`], a reader/writer lock the real-time thread never takes.

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::{StreamConfig, StreamGeometry, SAMPLE_BYTES};

mod thread;
pub use thread::{DiskThread, RtThread, ThreadRole};

mod transport;
pub use transport::Transport;

mod port;
pub use port::{AudioPort, PortBuffer};

mod sequence;
pub use sequence::{Clip, Sequence, SequenceSource};

mod track;
pub use track::{
    CaptureSpan, CaptureTrack, MemoryCapture, MemoryTrack, Region, SoloGroup, Take, TrackState,
};

pub use parking_lot::RwLock;
pub use std::sync::Arc;

/// Timeline structure shared with the disk threads.
pub type SharedTimeline<T> = Arc<RwLock<T>>;

/// Wrap a timeline structure for sharing with streams.
pub fn shared<T>(value: T) -> SharedTimeline<T> {
    Arc::new(RwLock::new(value))
}
