//! # Tapedeck - Disk Streaming Engine
//!
//! Moves audio between storage and the real-time audio callback without the
//! callback ever blocking, allocating or waiting on I/O.
//!
//! ## Architecture
//!
//! Tapedeck is an umbrella crate that re-exports:
//! - **tapedeck-core** - Collaborator contracts (config, thread tokens, transport, ports, sequences, tracks)
//! - **tapedeck-stream** - Streaming engine (bounded channels, playback, capture, punch recording)
//!
//! ## Quick Start
//!
//! ```ignore
//! use tapedeck::prelude::*;
//!
//! let transport = Arc::new(Transport::new());
//! let config = StreamConfig::default();
//!
//! let playback = PlaybackStream::new("gtr", config, shared(Sequence::new()),
//!     Arc::new(TrackState::default()), 256, 2)?;
//! let mut set: StreamSet<Sequence, MemoryTrack> = StreamSet::new(Arc::clone(&transport));
//! set.add_track("gtr", playback, None);
//! set.run()?;
//!
//! // audio callback
//! let rt = RtThread::enter();
//! set.process(&rt, &mut outputs, &mut inputs, 256);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Everything below
//! - `wav` - WAV capture tracks and clip loading

mod error;
pub use error::{Error, Result};

/// Re-export of tapedeck-core for direct access
pub use tapedeck_core as core;

/// Re-export of tapedeck-stream for direct access
pub use tapedeck_stream as stream;

pub use tapedeck_core::{
    shared, AudioPort, CaptureSpan, CaptureTrack, Clip, DiskThread, MemoryTrack, PortBuffer,
    Region, RtThread, Sequence, SequenceSource, SharedTimeline, SoloGroup, StreamConfig,
    StreamGeometry, ThreadRole, TrackState, Transport,
};

pub use tapedeck_stream::{
    CaptureStatus, CaptureStream, DiskStream, LocateDetector, PlaybackStatus, PlaybackStream,
    PunchWindow, StreamMetricsSnapshot, StreamSet, UNBOUNDED,
};

#[cfg(feature = "wav")]
pub use tapedeck_stream::{load_wav_clip, WavCaptureTrack};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Error, Result};

    pub use std::sync::Arc;

    pub use tapedeck_core::{
        shared, AudioPort, Clip, MemoryTrack, PortBuffer, Region, RtThread, Sequence,
        StreamConfig, TrackState, Transport,
    };

    pub use tapedeck_stream::{
        CaptureStream, DiskStream, PlaybackStream, PunchWindow, StreamSet, UNBOUNDED,
    };

    #[cfg(feature = "wav")]
    pub use tapedeck_stream::{load_wav_clip, WavCaptureTrack};
}
