//! Disk streaming between storage and the real-time audio callback.
//!
//! Every stream pairs one bounded channel per audio channel with a counting
//! semaphore of free blocks and a disk-service thread. The real-time side
//! only reads or writes its channel ends and posts the semaphore; the disk
//! thread does the slow work.
//!
//! # Features
//!
//! - **Playback**: sequence source to output ports, with sample-accurate seeks
//! - **Capture**: input ports to a capture track, with chained punch windows
//! - **Stream sets**: transport jumps, recording and resizing for every track
//! - **WAV capture**: one float WAV file per take via `hound`
//!
//! # Example
//!
//! ```ignore
//! use tapedeck_stream::{CaptureStream, DiskStream, PlaybackStream, PunchWindow};
//! use tapedeck_core::{shared, MemoryTrack, RtThread, Sequence, StreamConfig, TrackState};
//!
//! let config = StreamConfig::default();
//! let mut playback = PlaybackStream::new("gtr", config, shared(Sequence::new()),
//!     Arc::new(TrackState::default()), 256, 2)?;
//! playback.run()?;
//!
//! let mut capture = CaptureStream::new("vox", config, shared(MemoryTrack::new("vox")), 256, 1)?;
//! capture.set_punch([PunchWindow::new(5000, 8000)?]);
//! capture.start(0, 1000, tapedeck_stream::UNBOUNDED)?;
//!
//! // audio callback
//! let rt = RtThread::enter();
//! playback.process(&rt, &mut outputs, 256);
//! capture.process(&rt, &mut inputs, 256);
//! ```

// Error types
pub mod error;
pub use error::{Error, Result};

// Handshake primitives
mod channel;
pub use channel::{bounded_channel, ChannelEnd, ChannelReader, ChannelWriter};

mod semaphore;
pub use semaphore::BlockSemaphore;

mod metrics;
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};

mod base;
pub use base::{Direction, DiskStream, Input, Output, StreamBase};

// Streams
mod playback;
pub use playback::{PlaybackStatus, PlaybackStream};

mod punch;
pub use punch::{transition, PunchAction, PunchPlan, PunchState, PunchWindow, UNBOUNDED};

mod capture;
pub use capture::{CaptureStatus, CaptureStream};

mod locate;
pub use locate::LocateDetector;

mod set;
pub use set::{StreamSet, TrackStreams};

#[cfg(feature = "wav")]
mod wav;
#[cfg(feature = "wav")]
pub use wav::{load_wav_clip, WavCapture, WavCaptureTrack, WavTake};
