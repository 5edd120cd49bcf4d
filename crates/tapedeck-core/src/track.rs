//! Capture sinks and per-track monitoring state.

use crate::error::Result;
use crate::thread::DiskThread;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Frames a capture stream actually persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSpan {
    /// Timeline frame of the first persisted frame
    pub start: u64,
    /// Exact count of frames written
    pub frames: u64,
}

impl CaptureSpan {
    pub fn end(&self) -> u64 {
        self.start + self.frames
    }
}

/// A finalized recording placed on the track's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub start: u64,
    pub length: u64,
}

impl Region {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// Track that owns the on-disk objects created while capturing.
///
/// Every method runs on a disk-service thread with the timeline write lock
/// held.
pub trait CaptureTrack: Send + Sync {
    /// Open storage handle for one capture.
    type Capture: Send;

    /// Create the storage object for a capture starting at timeline frame `start`.
    fn record(&mut self, disk: &DiskThread, start: u64, channels: usize) -> Result<Self::Capture>;

    /// Append `frames` interleaved frames. Returns frames stored.
    fn write(
        &mut self,
        disk: &DiskThread,
        capture: &mut Self::Capture,
        buf: &[f32],
        frames: usize,
    ) -> Result<usize>;

    /// Close the capture and materialize it as a region.
    fn finalize(
        &mut self,
        disk: &DiskThread,
        capture: Self::Capture,
        span: CaptureSpan,
    ) -> Result<Region>;
}

/// A finalized in-memory take.
#[derive(Debug, Clone, PartialEq)]
pub struct Take {
    pub region: Region,
    pub channels: usize,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

/// Open in-memory capture.
#[derive(Debug)]
pub struct MemoryCapture {
    start: u64,
    channels: usize,
    samples: Vec<f32>,
}

/// Capture track that keeps takes in memory.
#[derive(Debug, Default)]
pub struct MemoryTrack {
    name: String,
    takes: Vec<Take>,
    captures_started: usize,
}

impl MemoryTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn takes(&self) -> &[Take] {
        &self.takes
    }

    pub fn captures_started(&self) -> usize {
        self.captures_started
    }
}

impl CaptureTrack for MemoryTrack {
    type Capture = MemoryCapture;

    fn record(&mut self, _disk: &DiskThread, start: u64, channels: usize) -> Result<MemoryCapture> {
        self.captures_started += 1;
        Ok(MemoryCapture {
            start,
            channels,
            samples: Vec::new(),
        })
    }

    fn write(
        &mut self,
        _disk: &DiskThread,
        capture: &mut MemoryCapture,
        buf: &[f32],
        frames: usize,
    ) -> Result<usize> {
        capture
            .samples
            .extend_from_slice(&buf[..frames * capture.channels]);
        Ok(frames)
    }

    fn finalize(
        &mut self,
        _disk: &DiskThread,
        capture: MemoryCapture,
        span: CaptureSpan,
    ) -> Result<Region> {
        debug_assert_eq!(capture.start, span.start);
        let region = Region {
            name: format!("{}-{}", self.name, self.captures_started),
            start: span.start,
            length: span.frames,
        };
        self.takes.push(Take {
            region: region.clone(),
            channels: capture.channels,
            samples: capture.samples,
        });
        Ok(region)
    }
}

/// Solo state shared by every track of a session.
#[derive(Debug, Default)]
pub struct SoloGroup {
    soloed: AtomicUsize,
}

impl SoloGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn any_soloed(&self) -> bool {
        self.soloed.load(Ordering::Acquire) > 0
    }
}

/// Mute and solo switches of one track, readable from the real-time thread.
#[derive(Debug)]
pub struct TrackState {
    mute: AtomicBool,
    solo: AtomicBool,
    group: Arc<SoloGroup>,
}

impl TrackState {
    pub fn new(group: Arc<SoloGroup>) -> Self {
        Self {
            mute: AtomicBool::new(false),
            solo: AtomicBool::new(false),
            group,
        }
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Acquire)
    }

    pub fn set_solo(&self, solo: bool) {
        if self.solo.swap(solo, Ordering::AcqRel) != solo {
            if solo {
                self.group.soloed.fetch_add(1, Ordering::AcqRel);
            } else {
                self.group.soloed.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    pub fn is_soloed(&self) -> bool {
        self.solo.load(Ordering::Acquire)
    }

    /// Muted, or another track is soloed.
    #[inline]
    pub fn is_silenced(&self) -> bool {
        self.is_muted() || (self.group.any_soloed() && !self.is_soloed())
    }
}

impl Default for TrackState {
    fn default() -> Self {
        Self::new(SoloGroup::new())
    }
}

impl Drop for TrackState {
    fn drop(&mut self) {
        self.set_solo(false);
    }
}
