//! Playback streams: sequence source to output ports.

use crate::base::{DiskContext, DiskStream, Output, StreamBase};
use crate::channel::ChannelWriter;
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tapedeck_core::{
    AudioPort, DiskThread, RtThread, SequenceSource, SharedTimeline, StreamConfig, TrackState,
};
use tracing::{debug, warn};

const NO_SEEK: u64 = u64::MAX;

/// Wait between attempts to take the timeline read lock.
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// Wait between checks for channel space.
const SPACE_RETRY: Duration = Duration::from_millis(2);

/// Lifecycle of a playback stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Filling,
    Seeking,
}

/// Seek request handed from the real-time thread to the disk thread.
#[derive(Debug)]
struct SeekState {
    target: AtomicU64,
    undelay: AtomicU64,
}

impl SeekState {
    fn new() -> Self {
        Self {
            target: AtomicU64::new(NO_SEEK),
            undelay: AtomicU64::new(0),
        }
    }

    /// Returns the target this request replaced, if one was pending.
    ///
    /// `u64::MAX` is the idle sentinel; a request for it lands one frame
    /// earlier.
    #[inline]
    fn request(&self, frame: u64) -> Option<u64> {
        let previous = self.target.swap(frame.min(NO_SEEK - 1), Ordering::AcqRel);
        (previous != NO_SEEK).then_some(previous)
    }

    #[inline]
    fn pending(&self) -> Option<u64> {
        let target = self.target.load(Ordering::Acquire);
        (target != NO_SEEK).then_some(target)
    }

    /// Clear the request unless a newer one replaced it.
    fn complete(&self, target: u64) {
        let _ = self
            .target
            .compare_exchange(target, NO_SEEK, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Streams a track's sequence to its output ports.
pub struct PlaybackStream<S: SequenceSource + ?Sized + 'static> {
    base: StreamBase<Output>,
    source: SharedTimeline<S>,
    track: Arc<TrackState>,
    seek: Arc<SeekState>,
}

impl<S: SequenceSource + ?Sized + 'static> PlaybackStream<S> {
    pub fn new(
        name: impl Into<String>,
        config: StreamConfig,
        source: SharedTimeline<S>,
        track: Arc<TrackState>,
        frame_count: usize,
        channels: usize,
    ) -> Result<Self> {
        Ok(Self {
            base: StreamBase::new(name, config, frame_count, channels)?,
            source,
            track,
            seek: Arc::new(SeekState::new()),
        })
    }

    pub fn channels(&self) -> usize {
        self.base.geometry().channels
    }

    pub fn source(&self) -> &SharedTimeline<S> {
        &self.source
    }

    pub fn track(&self) -> &Arc<TrackState> {
        &self.track
    }

    /// Next timeline frame the disk thread will read.
    pub fn frame(&self) -> u64 {
        self.base.shared().frame.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PlaybackStatus {
        if !self.base.is_running() {
            PlaybackStatus::Idle
        } else if self.seek.pending().is_some() {
            PlaybackStatus::Seeking
        } else {
            PlaybackStatus::Filling
        }
    }

    pub fn seek_pending(&self) -> bool {
        self.seek.pending().is_some()
    }

    /// Frames ready for the real-time thread on every channel.
    pub fn buffered_frames(&self) -> usize {
        self.base
            .rt_channels()
            .iter()
            .map(|reader| reader.available())
            .min()
            .unwrap_or(0)
    }

    /// Request that the disk thread refill from `frame`.
    ///
    /// Called before [`process`](Self::process) whenever the transport
    /// jumped. The flush itself happens on the disk thread.
    pub fn seek(&self, _rt: &RtThread, frame: u64) {
        if let Some(previous) = self.seek.request(frame) {
            warn!(
                stream = %self.base.name(),
                previous,
                frame,
                "new seek request while previous seek is still pending"
            );
        }
        // wake a disk thread parked on a full buffer
        self.base.block_processed();
    }

    /// Read `frames` earlier than the playback position from now on.
    pub fn undelay(&self, frames: u64) {
        self.seek.undelay.store(frames, Ordering::Release);
    }

    /// Drop blocks a seek made stale, freeing their space for the disk
    /// thread. [`process`](Self::process) does this itself; call it on
    /// callbacks that skip `process`, for example while the transport is
    /// stopped.
    pub fn release_stale(&mut self, _rt: &RtThread) {
        for reader in self.base.rt_channels_mut() {
            reader.skip_stale();
        }
    }

    /// Fill `outputs` (one port per channel) with the next `nframes` frames.
    ///
    /// Either every channel gets `nframes` frames of the same block, or every
    /// channel is silenced and one xrun is counted.
    pub fn process<P: AudioPort>(&mut self, rt: &RtThread, outputs: &mut [P], nframes: usize) -> usize {
        debug_assert_eq!(outputs.len(), self.channels());

        self.release_stale(rt);
        let silenced = self.track.is_silenced();
        let readers = self.base.rt_channels_mut();
        // marks after occupancy: a flush seen on some channels only is an underrun
        let ready = readers.iter().all(|reader| reader.occupied() >= nframes)
            && readers.iter().all(|reader| reader.stale() == 0);

        for (reader, port) in readers.iter_mut().zip(outputs.iter_mut()) {
            let buf = port.buffer(nframes);
            if !ready || !reader.read(buf) || silenced {
                buf.fill(0.0);
            }
        }

        if !ready {
            self.base.metrics().record_xrun();
        }
        self.base.block_processed();
        nframes
    }
}

impl<S: SequenceSource + ?Sized + 'static> DiskStream for PlaybackStream<S> {
    type Direction = Output;

    fn base(&self) -> &StreamBase<Output> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StreamBase<Output> {
        &mut self.base
    }

    fn run(&mut self) -> Result<()> {
        let source = Arc::clone(&self.source);
        let seek = Arc::clone(&self.seek);
        self.base
            .spawn(move |disk, context| playback_loop(disk, context, &source, &seek))
    }
}

enum Push {
    Done,
    Seek,
    Terminate,
}

/// Wait for room, then write one block.
fn push_block(
    writer: &mut ChannelWriter,
    block: &[f32],
    terminate: &AtomicBool,
    seek: &SeekState,
) -> Push {
    while writer.write_space() < block.len() {
        if terminate.load(Ordering::Acquire) {
            return Push::Terminate;
        }
        if seek.pending().is_some() {
            return Push::Seek;
        }
        thread::sleep(SPACE_RETRY);
    }
    writer.write(block);
    Push::Done
}

/// Read one interleaved batch starting at `start - undelay`. Frames before
/// the start of the timeline stay silent.
///
/// Returns `false` if the stream terminated while waiting for the lock.
fn read_batch<S: SequenceSource + ?Sized>(
    disk: &DiskThread,
    source: &RwLock<S>,
    batch: &mut [f32],
    start: u64,
    undelay: u64,
    channels: usize,
    terminate: &AtomicBool,
) -> bool {
    batch.fill(0.0);
    let frames = batch.len() / channels;
    let (from, lead) = match start.checked_sub(undelay) {
        Some(from) => (from, 0),
        None => (0, ((undelay - start) as usize).min(frames)),
    };
    if lead == frames {
        return true;
    }

    loop {
        if terminate.load(Ordering::Acquire) {
            return false;
        }
        if let Some(timeline) = source.try_read_for(LOCK_RETRY) {
            timeline.play(disk, &mut batch[lead * channels..], from, frames - lead, channels);
            return true;
        }
    }
}

fn playback_loop<S: SequenceSource + ?Sized>(
    disk: &DiskThread,
    mut context: DiskContext<Output>,
    source: &RwLock<S>,
    seek: &SeekState,
) -> Vec<ChannelWriter> {
    let geometry = context.geometry;
    let channels = geometry.channels;
    let block_samples = geometry.frame_count * channels;
    let mut batch = vec![0.0f32; geometry.batch_samples()];
    let mut block = vec![0.0f32; geometry.frame_count];
    let mut blocks_ready = 0;

    debug!(stream = %context.name, ?geometry, "playback thread running");

    'service: while context.wait_for_block() {
        if let Some(target) = seek.pending() {
            debug!(stream = %context.name, frame = target, "performing seek");
            context.flush();
            context.shared.frame.store(target, Ordering::Release);
            context.shared.metrics.record_seek();
            seek.complete(target);
            blocks_ready = 0;
        }

        blocks_ready += 1;
        if blocks_ready < geometry.disk_io_blocks {
            continue;
        }
        blocks_ready = 0;

        let start = context.shared.frame.load(Ordering::Acquire);
        let undelay = seek.undelay.load(Ordering::Acquire);
        if !read_batch(disk, source, &mut batch, start, undelay, channels, &context.terminate) {
            break;
        }
        context
            .shared
            .frame
            .store(start + geometry.batch_frames() as u64, Ordering::Release);
        context
            .shared
            .metrics
            .record_read(geometry.batch_frames() as u64);

        for frames in batch.chunks_exact(block_samples) {
            for (ch, writer) in context.channels.iter_mut().enumerate() {
                for (dst, frame) in block.iter_mut().zip(frames.chunks_exact(channels)) {
                    *dst = frame[ch];
                }
                match push_block(writer, &block, &context.terminate, seek) {
                    Push::Done => {}
                    Push::Seek => continue 'service,
                    Push::Terminate => break 'service,
                }
            }
        }
    }

    debug!(stream = %context.name, "playback thread terminating");
    context.into_channels()
}
