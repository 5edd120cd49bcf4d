//! Capture streams: input ports to a capture track.
//!
//! The real-time side copies each callback's input into the channels. The
//! disk thread reassembles blocks into interleaved batches, slices every
//! batch against the punch windows of the session and persists the slices
//! through the [`CaptureTrack`]. Region lengths come from the exact number of
//! frames the track accepted.

use crate::base::{DiskContext, DiskStream, Input, StreamBase, StreamShared};
use crate::channel::ChannelReader;
use crate::error::{Error, Result};
use crate::punch::{transition, PunchAction, PunchPlan, PunchState, PunchWindow, UNBOUNDED};
use parking_lot::{Mutex, RwLock};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tapedeck_core::{
    AudioPort, CaptureSpan, CaptureTrack, DiskThread, Region, RtThread, SharedTimeline,
    StreamConfig, SAMPLE_BYTES,
};
use tracing::{debug, error, info, warn};

/// Wait between checks for captured data.
const DATA_RETRY: Duration = Duration::from_millis(2);

/// Wait between checks for channel space while freewheeling.
const FREEWHEEL_RETRY: Duration = Duration::from_millis(10);

/// Checks for channel space before a freewheeling callback gives up and
/// counts an overrun.
const FREEWHEEL_ATTEMPTS: u32 = 500;

/// Where a capture session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureStatus {
    Idle = 0,
    /// Armed, waiting for the next window
    Recording = 1,
    PunchingIn = 2,
    PunchedIn = 3,
    PunchingOut = 4,
}

impl CaptureStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CaptureStatus::Recording,
            2 => CaptureStatus::PunchingIn,
            3 => CaptureStatus::PunchedIn,
            4 => CaptureStatus::PunchingOut,
            _ => CaptureStatus::Idle,
        }
    }
}

/// Session state shared by the control, real-time and disk threads.
#[derive(Debug)]
struct CaptureShared {
    /// The real-time side pushes input while set.
    armed: AtomicBool,
    /// Offline render: wait for space instead of dropping input.
    freewheel: AtomicBool,
    stop_frame: AtomicU64,
    frames_written: AtomicU64,
    status: AtomicU8,
    regions: Mutex<Vec<Region>>,
    error: Mutex<Option<Error>>,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            freewheel: AtomicBool::new(false),
            stop_frame: AtomicU64::new(UNBOUNDED),
            frames_written: AtomicU64::new(0),
            status: AtomicU8::new(CaptureStatus::Idle as u8),
            regions: Mutex::new(Vec::new()),
            error: Mutex::new(None),
        }
    }

    fn set_status(&self, status: CaptureStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn stop_frame(&self) -> u64 {
        self.stop_frame.load(Ordering::Acquire)
    }
}

/// Records a track's input ports through a [`CaptureTrack`].
pub struct CaptureStream<T: CaptureTrack + 'static> {
    base: StreamBase<Input>,
    track: SharedTimeline<T>,
    shared: Arc<CaptureShared>,
    punch: Vec<PunchWindow>,
    record_start: u64,
    record_stop: u64,
    monitor: Vec<Vec<f32>>,
}

impl<T: CaptureTrack + 'static> CaptureStream<T> {
    pub fn new(
        name: impl Into<String>,
        config: StreamConfig,
        track: SharedTimeline<T>,
        frame_count: usize,
        channels: usize,
    ) -> Result<Self> {
        let base = StreamBase::new(name, config, frame_count, channels)?;
        Ok(Self {
            base,
            track,
            shared: Arc::new(CaptureShared::new()),
            punch: Vec::new(),
            record_start: 0,
            record_stop: UNBOUNDED,
            monitor: vec![vec![0.0; frame_count]; channels],
        })
    }

    pub fn channels(&self) -> usize {
        self.base.geometry().channels
    }

    pub fn track(&self) -> &SharedTimeline<T> {
        &self.track
    }

    /// Punch windows for the next [`start`](Self::start). Empty means plain
    /// recording.
    pub fn set_punch(&mut self, windows: impl IntoIterator<Item = PunchWindow>) {
        self.punch = windows.into_iter().collect();
    }

    pub fn clear_punch(&mut self) {
        self.punch.clear();
    }

    pub fn punch_windows(&self) -> &[PunchWindow] {
        &self.punch
    }

    /// Arm recording of `[record_start, record_stop)` and start the disk
    /// thread. The first callback after this call carries `trigger_frame`.
    ///
    /// Pass [`UNBOUNDED`] as `record_stop` to record until [`stop`](Self::stop).
    pub fn start(&mut self, trigger_frame: u64, record_start: u64, record_stop: u64) -> Result<()> {
        if self.is_recording() {
            warn!(stream = %self.base.name(), "start() while already recording");
            return Err(Error::AlreadyRecording(self.base.name().to_string()));
        }

        // a finished session may still be draining
        self.base.shutdown();
        self.base.flush();

        self.record_start = record_start;
        self.record_stop = record_stop;
        self.shared.stop_frame.store(record_stop, Ordering::Release);
        self.shared.frames_written.store(0, Ordering::Release);
        self.base.shared().frame.store(trigger_frame, Ordering::Release);
        self.shared.set_status(CaptureStatus::Recording);

        info!(
            stream = %self.base.name(),
            trigger_frame,
            record_start,
            record_stop,
            punch_windows = self.punch.len(),
            "capture armed"
        );

        self.shared.armed.store(true, Ordering::Release);
        if let Err(e) = self.run() {
            self.shared.armed.store(false, Ordering::Release);
            self.shared.set_status(CaptureStatus::Idle);
            return Err(e);
        }
        Ok(())
    }

    /// Schedule the end of the session at `frame`.
    ///
    /// Data up to `frame` already in flight is still written; the disk thread
    /// finalizes once it gets there.
    pub fn stop(&self, frame: u64) -> Result<()> {
        if !self.is_recording() {
            warn!(stream = %self.base.name(), "stop() while not recording");
            return Err(Error::NotRecording(self.base.name().to_string()));
        }
        debug!(stream = %self.base.name(), frame, "capture stop scheduled");
        self.shared.stop_frame.store(frame, Ordering::Release);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    pub fn record_range(&self) -> Range<u64> {
        self.record_start..self.shared.stop_frame()
    }

    /// Frames persisted by the open or last capture.
    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Acquire)
    }

    /// Next timeline frame the disk thread will consume.
    pub fn frame(&self) -> u64 {
        self.base.shared().frame.load(Ordering::Acquire)
    }

    /// Regions finalized since the last call.
    pub fn take_regions(&self) -> Vec<Region> {
        std::mem::take(&mut *self.shared.regions.lock())
    }

    /// Storage error that aborted the last session.
    pub fn take_error(&self) -> Option<Error> {
        self.shared.error.lock().take()
    }

    /// Copy of the last callback's input, zeroed after an overrun.
    pub fn monitor(&self, channel: usize) -> &[f32] {
        &self.monitor[channel]
    }

    /// While freewheeling, [`process`](Self::process) blocks until the disk
    /// thread makes room instead of dropping input.
    pub fn set_freewheeling(&self, freewheeling: bool) {
        self.shared.freewheel.store(freewheeling, Ordering::Release);
    }

    pub fn is_freewheeling(&self) -> bool {
        self.shared.freewheel.load(Ordering::Acquire)
    }

    /// Push the next `nframes` frames from `inputs` (one port per channel).
    ///
    /// Returns frames pushed, 0 while not recording. On overrun whatever fits
    /// is still written, the monitor copy is zeroed and one xrun is counted.
    pub fn process<P: AudioPort>(&mut self, _rt: &RtThread, inputs: &mut [P], nframes: usize) -> usize {
        if !self.shared.armed.load(Ordering::Acquire) {
            return 0;
        }
        debug_assert_eq!(inputs.len(), self.channels());

        let has_space = |base: &StreamBase<Input>| {
            base.rt_channels()
                .iter()
                .all(|writer| writer.write_space() >= nframes)
        };
        let mut overrun = !has_space(&self.base);
        if overrun && self.shared.freewheel.load(Ordering::Acquire) {
            let mut attempts = 0;
            while overrun && attempts < FREEWHEEL_ATTEMPTS && self.base.is_running() {
                thread::sleep(FREEWHEEL_RETRY);
                overrun = !has_space(&self.base);
                attempts += 1;
            }
        }

        let writers = self.base.rt_channels_mut();
        for ((writer, port), monitor) in writers
            .iter_mut()
            .zip(inputs.iter_mut())
            .zip(self.monitor.iter_mut())
        {
            let buf = port.buffer(nframes);
            writer.write(buf);

            let n = nframes.min(monitor.len());
            if overrun {
                monitor[..n].fill(0.0);
            } else {
                monitor[..n].copy_from_slice(&buf[..n]);
            }
        }

        if overrun {
            self.base.metrics().record_xrun();
        }
        self.base.block_processed();
        nframes
    }
}

impl<T: CaptureTrack + 'static> DiskStream for CaptureStream<T> {
    type Direction = Input;

    fn base(&self) -> &StreamBase<Input> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StreamBase<Input> {
        &mut self.base
    }

    fn run(&mut self) -> Result<()> {
        let plan = PunchPlan::new(self.record_start, self.record_stop, &self.punch);
        let track = Arc::clone(&self.track);
        let shared = Arc::clone(&self.shared);
        self.base
            .spawn(move |disk, context| capture_loop(disk, context, &track, &shared, plan))
    }

    fn reallocate(&mut self, frame_count: usize) {
        self.base.reallocate(frame_count);
        let channels = self.channels();
        self.monitor = vec![vec![0.0; frame_count]; channels];
    }

    /// Resize for a new callback size. A running session is drained and
    /// finalized first; the disk thread is not restarted, the next
    /// [`start`](CaptureStream::start) does that.
    fn resize_buffers(&mut self, frame_count: usize) -> Result<()> {
        if frame_count == self.base.geometry().frame_count {
            return Ok(());
        }
        if self.is_recording() {
            warn!(
                stream = %self.base.name(),
                frame = self.frame(),
                "buffer resize ends the running capture"
            );
        }
        debug!(
            stream = %self.base.name(),
            from = self.base.geometry().frame_count,
            to = frame_count,
            "resizing buffers"
        );
        self.shutdown();
        self.reallocate(frame_count);
        self.flush();
        Ok(())
    }
}

/// Disk-side state of one capture session.
struct Session<'a, T: CaptureTrack> {
    name: &'a str,
    track: &'a RwLock<T>,
    shared: &'a CaptureShared,
    stream: &'a StreamShared,
    channels: usize,
    plan: PunchPlan,
    state: PunchState,
    /// Open capture and the frame of its first sample.
    capture: Option<(T::Capture, u64)>,
    frames_written: u64,
    done: bool,
}

impl<T: CaptureTrack> Session<'_, T> {
    /// Run one batch starting at the stream cursor through the punch logic.
    fn run_batch(&mut self, disk: &DiskThread, samples: &[f32]) {
        let start = self.stream.frame.load(Ordering::Acquire);
        let frames = (samples.len() / self.channels) as u64;
        let range = start..start + frames;

        if !self.done {
            if let Err(e) = self.slice_batch(disk, samples, range.clone()) {
                self.abort(disk, e);
            }
        }
        self.stream.frame.store(range.end, Ordering::Release);
    }

    fn slice_batch(&mut self, disk: &DiskThread, samples: &[f32], range: Range<u64>) -> Result<()> {
        let mut from = range.start;

        while let Some(window) = self.plan.current(self.shared.stop_frame()) {
            let (next, action) = transition(self.state, from..range.end, window);
            self.state = next;

            self.shared.set_status(match action {
                PunchAction::Discard => CaptureStatus::Recording,
                PunchAction::PunchIn(_) => CaptureStatus::PunchingIn,
                PunchAction::Write(_) => CaptureStatus::PunchedIn,
                PunchAction::PunchOut(_) | PunchAction::PunchInOut(_) => {
                    CaptureStatus::PunchingOut
                }
            });

            if let Some(r) = action.write_range() {
                let offset = (r.start - range.start) as usize * self.channels;
                let frames = (r.end - r.start) as usize;
                self.write(disk, r.start, &samples[offset..offset + frames * self.channels])?;
            }

            if !action.closes() {
                if next == PunchState::PunchedIn {
                    self.shared.set_status(CaptureStatus::PunchedIn);
                }
                return Ok(());
            }

            self.finalize(disk)?;
            from = window.end.max(from);
            if self.plan.advance().is_some() {
                debug!(stream = %self.name, "re-armed for next punch window");
            }
            self.shared.set_status(CaptureStatus::Recording);
        }

        // no window left before the stop frame
        self.finalize(disk)?;
        self.done = true;
        Ok(())
    }

    fn write(&mut self, disk: &DiskThread, start: u64, samples: &[f32]) -> Result<()> {
        let frames = samples.len() / self.channels;
        let timeline = self.track;
        let mut track = timeline.write();

        if self.capture.is_none() {
            let capture = track.record(disk, start, self.channels)?;
            debug!(stream = %self.name, frame = start, "capture opened");
            self.frames_written = 0;
            self.shared.frames_written.store(0, Ordering::Release);
            self.capture = Some((capture, start));
        }
        let Some((capture, _)) = self.capture.as_mut() else {
            return Ok(());
        };

        let stored = track.write(disk, capture, samples, frames)? as u64;
        self.frames_written += stored;
        self.shared
            .frames_written
            .fetch_add(stored, Ordering::AcqRel);
        self.stream.metrics.record_write(
            stored,
            stored * (self.channels * SAMPLE_BYTES) as u64,
        );
        Ok(())
    }

    fn finalize(&mut self, disk: &DiskThread) -> Result<()> {
        let Some((capture, start)) = self.capture.take() else {
            return Ok(());
        };

        let span = CaptureSpan {
            start,
            frames: self.frames_written,
        };
        let region = self.track.write().finalize(disk, capture, span)?;
        info!(
            stream = %self.name,
            region = %region.name,
            start = region.start,
            length = region.length,
            "capture finalized"
        );
        self.shared.regions.lock().push(region);
        self.stream.metrics.record_capture();
        Ok(())
    }

    fn abort(&mut self, disk: &DiskThread, err: Error) {
        error!(stream = %self.name, error = %err, "capture storage failed, aborting session");
        self.shared.armed.store(false, Ordering::Release);
        if let Err(e) = self.finalize(disk) {
            warn!(stream = %self.name, error = %e, "could not finalize partial capture");
        }
        *self.shared.error.lock() = Some(err);
        self.done = true;
    }

    /// Finalize whatever is still open.
    fn close(&mut self, disk: &DiskThread) {
        if let Err(e) = self.finalize(disk) {
            self.abort(disk, e);
        }
        self.done = true;
        self.shared.set_status(CaptureStatus::Idle);
    }
}

fn blocks_ready(channels: &[ChannelReader], frames: usize) -> bool {
    channels.iter().all(|reader| reader.available() >= frames)
}

/// Wait until every channel holds a block. `false` on terminate.
fn wait_for_data(channels: &[ChannelReader], frames: usize, terminate: &AtomicBool) -> bool {
    while !blocks_ready(channels, frames) {
        if terminate.load(Ordering::Acquire) {
            return false;
        }
        thread::sleep(DATA_RETRY);
    }
    true
}

/// Read one block per channel and interleave it into `dst`.
fn read_block(channels: &mut [ChannelReader], block: &mut [f32], dst: &mut [f32]) {
    let count = channels.len();
    for (ch, reader) in channels.iter_mut().enumerate() {
        reader.skip_stale();
        if !reader.read(block) {
            block.fill(0.0);
        }
        for (frame, &sample) in dst.chunks_exact_mut(count).zip(block.iter()) {
            frame[ch] = sample;
        }
    }
}

fn capture_loop<T: CaptureTrack>(
    disk: &DiskThread,
    mut context: DiskContext<Input>,
    track: &RwLock<T>,
    shared: &CaptureShared,
    plan: PunchPlan,
) -> Vec<ChannelReader> {
    let geometry = context.geometry;
    let block_samples = geometry.frame_count * geometry.channels;
    let mut batch = vec![0.0f32; geometry.batch_samples()];
    let mut block = vec![0.0f32; geometry.frame_count];
    let mut filled = 0;

    let stream = Arc::clone(&context.shared);
    let name = context.name.clone();
    let mut session = Session {
        name: &name,
        track,
        shared,
        stream: &stream,
        channels: geometry.channels,
        done: plan.is_empty(),
        plan,
        state: PunchState::default(),
        capture: None,
        frames_written: 0,
    };

    debug!(stream = %name, ?geometry, "capture thread running");

    while !session.done && context.wait_for_block() {
        if !wait_for_data(&context.channels, geometry.frame_count, &context.terminate) {
            break;
        }
        let dst = &mut batch[filled * block_samples..(filled + 1) * block_samples];
        read_block(&mut context.channels, &mut block, dst);
        filled += 1;

        if filled == geometry.disk_io_blocks {
            session.run_batch(disk, &batch);
            filled = 0;
        }
    }

    // drain what the real-time side already pushed
    if !session.done {
        debug!(stream = %name, "draining capture buffers");
        while !session.done && blocks_ready(&context.channels, geometry.frame_count) {
            let dst = &mut batch[filled * block_samples..(filled + 1) * block_samples];
            read_block(&mut context.channels, &mut block, dst);
            filled += 1;
            if filled == geometry.disk_io_blocks {
                session.run_batch(disk, &batch);
                filled = 0;
            }
        }
        if filled > 0 {
            session.run_batch(disk, &batch[..filled * block_samples]);
        }
    }

    session.close(disk);
    shared.armed.store(false, Ordering::Release);
    context.flush();

    debug!(stream = %name, "capture thread terminating");
    context.into_channels()
}
