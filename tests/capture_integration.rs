//! Capture stream integration tests
//!
//! Tests the real-time side pushing input blocks and the disk thread
//! persisting them through a capture track: plain takes, punch windows,
//! overruns and storage failures.
//!
//! Run with:
//! ```bash
//! cargo test -p tapedeck --test capture_integration
//! ```

#[path = "helpers/mod.rs"]
mod helpers;

use helpers::{
    frame_value, init_tracing, staircase_ports, test_config, wait_until, DISK_TIMEOUT,
    TEST_BUFFER_SIZE,
};
use std::time::Duration;
use tapedeck::core::{CaptureSpan, CaptureTrack, DiskThread};
use tapedeck::prelude::*;
use tapedeck::CaptureStatus;

fn capture_stream(
    config: StreamConfig,
    frame_count: usize,
    channels: usize,
) -> CaptureStream<MemoryTrack> {
    CaptureStream::new(
        "vox",
        config,
        shared(MemoryTrack::new("vox")),
        frame_count,
        channels,
    )
    .unwrap()
}

/// Push staircase input from `start` until the session ends or `max_blocks`
/// callbacks went by. Returns the next frame.
fn push_until_idle<T: CaptureTrack>(
    stream: &mut CaptureStream<T>,
    start: u64,
    frame_count: usize,
    max_blocks: usize,
) -> u64 {
    let rt = RtThread::enter();
    let mut frame = start;
    for _ in 0..max_blocks {
        if !stream.is_recording() {
            break;
        }
        let mut inputs = staircase_ports(frame, frame_count, stream.channels());
        stream.process(&rt, &mut inputs, frame_count);
        frame += frame_count as u64;
        std::thread::sleep(Duration::from_millis(1));
    }
    frame
}

fn assert_staircase_take(samples: &[f32], start: u64, frames: u64, channels: usize) {
    assert_eq!(samples.len(), frames as usize * channels);
    for (i, frame) in samples.chunks_exact(channels).enumerate() {
        for (ch, &sample) in frame.iter().enumerate() {
            assert_eq!(
                sample,
                frame_value(start + i as u64, ch),
                "sample {} of channel {}",
                i,
                ch
            );
        }
    }
}

// =============================================================================
// Plain recording
// =============================================================================

/// Recording at 256-frame blocks and stopping at S yields one region
/// `[0, S)` holding exactly the input.
#[test]
fn test_capture_round_trip() {
    init_tracing();
    let mut stream = capture_stream(test_config(), 256, 2);
    stream.start(0, 0, UNBOUNDED).unwrap();
    stream.stop(10_000).unwrap();
    assert_eq!(stream.record_range(), 0..10_000);

    push_until_idle(&mut stream, 0, 256, 400);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].name, "vox-1");
    assert_eq!(regions[0].start, 0);
    assert_eq!(regions[0].length, 10_000);
    assert_eq!(stream.frames_written(), 10_000);
    assert_eq!(stream.status(), CaptureStatus::Idle);

    let track = stream.track().read();
    assert_eq!(track.takes().len(), 1);
    assert_staircase_take(&track.takes()[0].samples, 0, 10_000, 2);
}

/// A session bounded by its record range ends on its own.
#[test]
fn test_capture_stops_at_record_stop() {
    let mut stream = capture_stream(test_config(), TEST_BUFFER_SIZE, 1);
    stream.start(0, 0, 3000).unwrap();

    push_until_idle(&mut stream, 0, TEST_BUFFER_SIZE, 200);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].start, regions[0].length), (0, 3000));
}

/// Shutdown before a full transfer drains what was pushed and finalizes at
/// the stop frame.
#[test]
fn test_shutdown_drains_pending_blocks() {
    // 187-block transfers, far more than the test pushes
    let mut stream = capture_stream(StreamConfig::new(48000.0), 256, 1);
    stream.start(0, 0, UNBOUNDED).unwrap();
    stream.stop(6000).unwrap();

    let rt = RtThread::enter();
    for block in 0..40u64 {
        let mut inputs = staircase_ports(block * 256, 256, 1);
        stream.process(&rt, &mut inputs, 256);
    }
    assert!(stream.is_recording());

    stream.shutdown();
    assert!(!stream.is_recording());

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].start, regions[0].length), (0, 6000));
    assert_staircase_take(&stream.track().read().takes()[0].samples, 0, 6000, 1);
}

/// A finished session can be followed by another on the same stream.
#[test]
fn test_consecutive_sessions() {
    let mut stream = capture_stream(test_config(), TEST_BUFFER_SIZE, 1);

    stream.start(0, 0, 2048).unwrap();
    push_until_idle(&mut stream, 0, TEST_BUFFER_SIZE, 200);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    stream.start(10_000, 10_000, 12_048).unwrap();
    push_until_idle(&mut stream, 10_000, TEST_BUFFER_SIZE, 200);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[1].name, "vox-2");
    assert_eq!((regions[1].start, regions[1].length), (10_000, 2048));
    assert_staircase_take(
        &stream.track().read().takes()[1].samples,
        10_000,
        2048,
        1,
    );
}

// =============================================================================
// Punch recording
// =============================================================================

/// Record from 1000 with a punch window `[5000, 8000)` at 512-frame blocks:
/// exactly one region of 3000 frames starting at 5000.
fn punch_once(config: StreamConfig) {
    let mut stream = capture_stream(config, TEST_BUFFER_SIZE, 1);
    stream.set_punch([PunchWindow::new(5000, 8000).unwrap()]);
    stream.start(1000, 1000, UNBOUNDED).unwrap();

    push_until_idle(&mut stream, 1000, TEST_BUFFER_SIZE, 400);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].start, 5000);
    assert_eq!(regions[0].length, 3000);

    let track = stream.track().read();
    assert_eq!(track.captures_started(), 1);
    assert_staircase_take(&track.takes()[0].samples, 5000, 3000, 1);
}

#[test]
fn test_punch_window_accuracy() {
    init_tracing();
    punch_once(test_config());
}

#[test]
fn test_punch_window_accuracy_single_block_transfers() {
    punch_once(test_config().with_disk_chunk_kbytes(0));
}

#[test]
fn test_punch_window_accuracy_two_block_transfers() {
    punch_once(test_config().with_disk_chunk_kbytes(4));
}

/// Chained windows re-arm without restarting the stream; one region per
/// window.
#[test]
fn test_multiple_punch_windows() {
    let mut stream = capture_stream(test_config().with_disk_chunk_kbytes(4), TEST_BUFFER_SIZE, 1);
    stream.set_punch([
        PunchWindow::new(5000, 6500).unwrap(),
        PunchWindow::new(2000, 3000).unwrap(),
    ]);
    stream.start(0, 0, UNBOUNDED).unwrap();

    push_until_idle(&mut stream, 0, TEST_BUFFER_SIZE, 400);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let regions = stream.take_regions();
    let spans: Vec<_> = regions.iter().map(|r| (r.start, r.length)).collect();
    assert_eq!(spans, vec![(2000, 1000), (5000, 1500)]);

    let track = stream.track().read();
    assert_eq!(track.captures_started(), 2);
    assert_staircase_take(&track.takes()[0].samples, 2000, 1000, 1);
    assert_staircase_take(&track.takes()[1].samples, 5000, 1500, 1);
    assert_eq!(stream.base().metrics().snapshot().captures, 2);
}

/// A stop inside a window truncates it.
#[test]
fn test_stop_truncates_window() {
    let mut stream = capture_stream(test_config(), TEST_BUFFER_SIZE, 1);
    stream.set_punch([PunchWindow::new(2000, 9000).unwrap()]);
    stream.start(0, 0, UNBOUNDED).unwrap();
    stream.stop(4000).unwrap();

    push_until_idle(&mut stream, 0, TEST_BUFFER_SIZE, 400);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].start, regions[0].length), (2000, 2000));
}

// =============================================================================
// Overruns
// =============================================================================

/// When the disk thread stalls the real-time side keeps going: overruns are
/// counted and the monitor copy is zeroed.
#[test]
fn test_overrun_with_stalled_disk_thread() {
    init_tracing();
    // four blocks, two per transfer
    let config = test_config()
        .with_buffering_seconds(0.05)
        .with_disk_chunk_kbytes(4);
    let mut stream = capture_stream(config, TEST_BUFFER_SIZE, 1);
    assert_eq!(stream.base().geometry().total_blocks, 4);

    let track = Arc::clone(stream.track());
    let guard = track.write();
    stream.start(0, 0, UNBOUNDED).unwrap();

    let rt = RtThread::enter();
    for block in 0..10u64 {
        let mut inputs = staircase_ports(block * 512, TEST_BUFFER_SIZE, 1);
        assert_eq!(stream.process(&rt, &mut inputs, TEST_BUFFER_SIZE), TEST_BUFFER_SIZE);
        std::thread::sleep(Duration::from_millis(2));
    }

    assert!(stream.xruns() >= 1);
    assert!(stream.monitor(0).iter().all(|&s| s == 0.0));
    assert!(stream.is_recording());

    drop(guard);
    stream.shutdown();

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert!(regions[0].length > 0);
    assert!(regions[0].length < 10 * TEST_BUFFER_SIZE as u64);
}

/// Freewheeling waits for the stalled disk thread instead of dropping
/// input: no overruns and the take is complete.
#[test]
fn test_freewheel_waits_for_stalled_disk_thread() {
    let config = test_config()
        .with_buffering_seconds(0.05)
        .with_disk_chunk_kbytes(4);
    let mut stream = capture_stream(config, TEST_BUFFER_SIZE, 1);
    stream.set_freewheeling(true);

    // hold the track from another thread for a while
    let track = Arc::clone(stream.track());
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let release = std::thread::spawn(move || {
        let _guard = track.write();
        locked_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
    });
    locked_rx.recv().unwrap();

    stream.start(0, 0, UNBOUNDED).unwrap();
    stream.stop(10 * TEST_BUFFER_SIZE as u64).unwrap();

    let rt = RtThread::enter();
    for block in 0..10u64 {
        let mut inputs = staircase_ports(block * 512, TEST_BUFFER_SIZE, 1);
        stream.process(&rt, &mut inputs, TEST_BUFFER_SIZE);
    }
    release.join().unwrap();
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    assert_eq!(stream.xruns(), 0);
    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].start, regions[0].length), (0, 5120));
    assert_staircase_take(&stream.track().read().takes()[0].samples, 0, 5120, 1);
}

/// Resizing a recording stream finalizes the take; the next session runs
/// at the new block size.
#[test]
fn test_resize_ends_running_take() {
    let mut stream = capture_stream(test_config(), TEST_BUFFER_SIZE, 1);
    stream.start(0, 0, UNBOUNDED).unwrap();
    stream.stop(2048).unwrap();

    let rt = RtThread::enter();
    for block in 0..4u64 {
        let mut inputs = staircase_ports(block * 512, TEST_BUFFER_SIZE, 1);
        stream.process(&rt, &mut inputs, TEST_BUFFER_SIZE);
    }
    stream.resize_buffers(256).unwrap();
    assert!(!stream.is_recording());
    assert!(!stream.is_running());
    assert_eq!(stream.base().geometry().frame_count, 256);

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].start, regions[0].length), (0, 2048));

    stream.start(8000, 8000, 9024).unwrap();
    push_until_idle(&mut stream, 8000, 256, 200);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));
    let regions = stream.take_regions();
    assert_eq!((regions[0].start, regions[0].length), (8000, 1024));
}

/// Without an overrun the monitor mirrors the last input.
#[test]
fn test_monitor_mirrors_input() {
    let mut stream = capture_stream(test_config(), TEST_BUFFER_SIZE, 2);
    stream.start(0, 0, UNBOUNDED).unwrap();

    let rt = RtThread::enter();
    let mut inputs = staircase_ports(0, TEST_BUFFER_SIZE, 2);
    stream.process(&rt, &mut inputs, TEST_BUFFER_SIZE);
    assert_eq!(stream.monitor(0), inputs[0].samples());
    assert_eq!(stream.monitor(1), inputs[1].samples());
    assert_eq!(stream.xruns(), 0);
    stream.shutdown();
}

// =============================================================================
// Storage failures
// =============================================================================

/// Capture track whose storage fills up after a number of writes.
struct FailingTrack {
    writes_left: usize,
}

impl CaptureTrack for FailingTrack {
    type Capture = ();

    fn record(&mut self, _disk: &DiskThread, _start: u64, _channels: usize) -> tapedeck::core::Result<()> {
        Ok(())
    }

    fn write(
        &mut self,
        _disk: &DiskThread,
        _capture: &mut (),
        _buf: &[f32],
        frames: usize,
    ) -> tapedeck::core::Result<usize> {
        if self.writes_left == 0 {
            return Err(tapedeck::core::Error::Storage("disk full".into()));
        }
        self.writes_left -= 1;
        Ok(frames)
    }

    fn finalize(
        &mut self,
        _disk: &DiskThread,
        _capture: (),
        span: CaptureSpan,
    ) -> tapedeck::core::Result<Region> {
        Ok(Region {
            name: "partial".into(),
            start: span.start,
            length: span.frames,
        })
    }
}

/// A storage error aborts the session, keeps what was written and is
/// reported once.
#[test]
fn test_storage_failure_aborts_session() {
    let mut stream = CaptureStream::new(
        "full",
        test_config(),
        shared(FailingTrack { writes_left: 2 }),
        TEST_BUFFER_SIZE,
        1,
    )
    .unwrap();
    let batch = stream.base().geometry().batch_frames() as u64;
    stream.start(0, 0, UNBOUNDED).unwrap();

    push_until_idle(&mut stream, 0, TEST_BUFFER_SIZE, 400);
    assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

    let err = stream.take_error().expect("storage error reported");
    assert!(matches!(
        err,
        tapedeck::stream::Error::Core(tapedeck::core::Error::Storage(_))
    ));
    assert!(stream.take_error().is_none());

    let regions = stream.take_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].start, regions[0].length), (0, 2 * batch));

    let rt = RtThread::enter();
    let mut inputs = staircase_ports(0, TEST_BUFFER_SIZE, 1);
    assert_eq!(stream.process(&rt, &mut inputs, TEST_BUFFER_SIZE), 0);
}

// =============================================================================
// WAV capture
// =============================================================================

#[cfg(feature = "wav")]
mod wav {
    use super::*;
    use tempfile::TempDir;

    /// A take written through a WAV track loads back as the same clip.
    #[test]
    fn test_wav_capture_round_trip() {
        let dir = TempDir::new().unwrap();
        let track = shared(WavCaptureTrack::new("vox", dir.path(), 48000));
        let mut stream =
            CaptureStream::new("vox", test_config(), Arc::clone(&track), 256, 2).unwrap();
        stream.start(0, 0, 4096).unwrap();

        push_until_idle(&mut stream, 0, 256, 200);
        assert!(wait_until(DISK_TIMEOUT, || !stream.is_recording()));

        let regions = stream.take_regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "vox-1");

        let path = dir.path().join("vox-1.wav");
        assert_eq!(track.read().takes()[0].path, path);

        let clip = load_wav_clip(&path, regions[0].start).unwrap();
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.frames(), 4096);
        assert_staircase_take(&clip.samples, 0, 4096, 2);
    }
}
