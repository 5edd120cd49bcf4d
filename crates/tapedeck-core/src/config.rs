//! Disk streaming configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bytes per stored sample (32-bit float).
pub const SAMPLE_BYTES: usize = core::mem::size_of::<f32>();

/// Buffering parameters shared by every stream of an engine.
///
/// Passed by value into each stream constructor; two streams built from
/// different configs never influence each other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Engine sample rate in Hz (default: 48000)
    pub sample_rate: f64,
    /// Seconds of audio held between the real-time and disk threads (default: 2.0)
    pub buffering_seconds: f64,
    /// Target size of one disk transfer in KiB, 0 = one block per transfer (default: 256)
    pub disk_chunk_kbytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            buffering_seconds: 2.0,
            disk_chunk_kbytes: 256,
        }
    }
}

impl StreamConfig {
    /// Create config for a sample rate with default buffering.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    pub fn with_buffering_seconds(mut self, seconds: f64) -> Self {
        self.buffering_seconds = seconds;
        self
    }

    pub fn with_disk_chunk_kbytes(mut self, kbytes: usize) -> Self {
        self.disk_chunk_kbytes = kbytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.buffering_seconds.is_finite() && self.buffering_seconds > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "buffering duration must be positive, got {}",
                self.buffering_seconds
            )));
        }
        Ok(())
    }

    /// Number of callback-blocks that fit in the buffering duration.
    pub fn total_blocks(&self, frame_count: usize) -> usize {
        let frames = self.sample_rate * self.buffering_seconds;
        ((frames / frame_count.max(1) as f64) as usize).max(1)
    }

    /// Callback-blocks batched per disk transfer.
    ///
    /// Never more than half the buffer, so the real-time side always has
    /// data to drain while a transfer is in flight.
    pub fn disk_io_blocks(&self, frame_count: usize, channels: usize) -> usize {
        let ceiling = (self.total_blocks(frame_count) / 2).max(1);
        if self.disk_chunk_kbytes == 0 {
            return 1;
        }
        let block_bytes = frame_count.max(1) * channels.max(1) * SAMPLE_BYTES;
        (self.disk_chunk_kbytes * 1024 / block_bytes).clamp(1, ceiling)
    }

    pub fn geometry(&self, frame_count: usize, channels: usize) -> StreamGeometry {
        StreamGeometry {
            frame_count,
            channels,
            total_blocks: self.total_blocks(frame_count),
            disk_io_blocks: self.disk_io_blocks(frame_count, channels),
        }
    }
}

/// Buffer layout derived from a [`StreamConfig`] and the engine block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    /// Frames per real-time callback
    pub frame_count: usize,
    /// Audio channels, one bounded channel each
    pub channels: usize,
    /// Callback-blocks held per channel
    pub total_blocks: usize,
    /// Callback-blocks per disk transfer
    pub disk_io_blocks: usize,
}

impl StreamGeometry {
    /// Capacity of each bounded channel in frames.
    pub fn capacity_frames(&self) -> usize {
        self.total_blocks * self.frame_count
    }

    /// Frames moved by one disk transfer.
    pub fn batch_frames(&self) -> usize {
        self.disk_io_blocks * self.frame_count
    }

    /// Interleaved samples in one disk transfer.
    pub fn batch_samples(&self) -> usize {
        self.batch_frames() * self.channels
    }
}
