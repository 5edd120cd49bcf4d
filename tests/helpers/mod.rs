//! Test helpers and fixtures for tapedeck integration tests
//!
//! Signals are integer staircases: the sample for timeline frame `f` is
//! `f + 1`, so silence (0.0) never collides with real data and every block
//! can be checked for the exact frames it carries.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use std::time::{Duration, Instant};
use tapedeck::prelude::*;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 512;

/// Upper bound for anything a disk thread has to do in a test.
pub const DISK_TIMEOUT: Duration = Duration::from_secs(5);

/// Small buffers (23 blocks of 512) with 4-block disk transfers at stereo.
pub fn test_config() -> StreamConfig {
    StreamConfig::new(TEST_SAMPLE_RATE)
        .with_buffering_seconds(0.25)
        .with_disk_chunk_kbytes(16)
}

/// Install a test subscriber so disk-thread logs show up with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Sample value carried by timeline frame `frame` on channel `channel`.
///
/// Odd channels carry the negated value.
pub fn frame_value(frame: u64, channel: usize) -> f32 {
    let v = (frame + 1) as f32;
    if channel % 2 == 0 {
        v
    } else {
        -v
    }
}

/// Integer staircase for frames `start..start + num_samples` on `channel`.
pub fn generate_staircase(start: u64, num_samples: usize, channel: usize) -> Vec<f32> {
    (0..num_samples as u64)
        .map(|i| frame_value(start + i, channel))
        .collect()
}

/// Sequence holding a staircase clip of `frames` frames at position 0.
pub fn staircase_sequence(frames: usize, channels: usize) -> Sequence {
    let per_channel: Vec<Vec<f32>> = (0..channels)
        .map(|ch| generate_staircase(0, frames, ch))
        .collect();
    let mut sequence = Sequence::new();
    sequence.add_clip(Clip::from_channels(0, &per_channel));
    sequence
}

/// Input ports carrying frames `start..start + frames`.
pub fn staircase_ports(start: u64, frames: usize, channels: usize) -> Vec<PortBuffer> {
    (0..channels)
        .map(|ch| PortBuffer::from_samples(generate_staircase(start, frames, ch)))
        .collect()
}

/// Output ports for one callback.
pub fn output_ports(frames: usize, channels: usize) -> Vec<PortBuffer> {
    vec![PortBuffer::new(frames); channels]
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// First timeline frame carried by a staircase block, or `None` for
/// silence. Panics if the block mixes content from different positions.
pub fn staircase_start(block: &[f32]) -> Option<u64> {
    let first = *block.first()?;
    if first == 0.0 {
        assert_silence(block, tolerances::SILENCE_THRESHOLD);
        return None;
    }
    for (i, pair) in block.windows(2).enumerate() {
        assert_eq!(
            pair[1].abs() - pair[0].abs(),
            1.0,
            "torn block at sample {}: {} then {}",
            i,
            pair[0],
            pair[1]
        );
    }
    Some(first.abs() as u64 - 1)
}
