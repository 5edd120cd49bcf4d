//! Per-stream I/O and xrun counters.
//!
//! Counters are updated from both the real-time and disk threads, so every
//! field is a relaxed atomic. Read them through [`StreamMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one disk stream.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Real-time underruns (playback) or overruns (capture)
    xruns: AtomicU64,
    /// Frames pulled from the sequence source
    frames_read: AtomicU64,
    /// Batches pulled from the sequence source
    read_ops: AtomicU64,
    /// Frames handed to the capture track
    frames_written: AtomicU64,
    /// Bytes handed to the capture track
    bytes_written: AtomicU64,
    /// Batch writes to the capture track
    write_ops: AtomicU64,
    /// Seeks performed by the disk thread
    seeks: AtomicU64,
    /// Regions finalized
    captures: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_read(&self, frames: u64) {
        self.frames_read.fetch_add(frames, Ordering::Relaxed);
        self.read_ops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write(&self, frames: u64, bytes: u64) {
        self.frames_written.fetch_add(frames, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.write_ops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_seek(&self) {
        self.seeks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_capture(&self) {
        self.captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            xruns: self.xruns.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            read_ops: self.read_ops.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_ops: self.write_ops.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
            captures: self.captures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.xruns.store(0, Ordering::Relaxed);
        self.frames_read.store(0, Ordering::Relaxed);
        self.read_ops.store(0, Ordering::Relaxed);
        self.frames_written.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.write_ops.store(0, Ordering::Relaxed);
        self.seeks.store(0, Ordering::Relaxed);
        self.captures.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`StreamMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    pub xruns: u64,
    pub frames_read: u64,
    pub read_ops: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub write_ops: u64,
    pub seeks: u64,
    pub captures: u64,
}

impl StreamMetricsSnapshot {
    /// Average frames per source read.
    pub fn avg_read_frames(&self) -> u64 {
        if self.read_ops == 0 {
            0
        } else {
            self.frames_read / self.read_ops
        }
    }

    /// Average bytes per capture write.
    pub fn avg_write_size(&self) -> u64 {
        if self.write_ops == 0 {
            0
        } else {
            self.bytes_written / self.write_ops
        }
    }
}
