//! Machinery shared by playback and capture streams.
//!
//! A [`StreamBase`] owns one bounded channel per audio channel, the block
//! semaphore and the disk thread. The real-time ends of the channels stay in
//! the base; the disk ends move into the disk thread while it runs and come
//! back when it is joined.

use crate::channel::{bounded_channel, ChannelEnd, ChannelReader, ChannelWriter};
use crate::error::{Error, Result};
use crate::metrics::StreamMetrics;
use crate::semaphore::BlockSemaphore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tapedeck_core::{DiskThread, StreamConfig, StreamGeometry};
use tracing::{debug, warn};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Data direction of a stream.
pub trait Direction: Send + 'static {
    /// End held by the real-time thread.
    type Rt: ChannelEnd;
    /// End held by the disk thread.
    type Disk: ChannelEnd + 'static;

    /// Output streams start with every block free for the disk thread.
    const IS_OUTPUT: bool;

    fn split(writer: ChannelWriter, reader: ChannelReader) -> (Self::Rt, Self::Disk);
}

/// Disk to real-time (playback).
#[derive(Debug)]
pub struct Output;

/// Real-time to disk (capture).
#[derive(Debug)]
pub struct Input;

impl Direction for Output {
    type Rt = ChannelReader;
    type Disk = ChannelWriter;
    const IS_OUTPUT: bool = true;

    fn split(writer: ChannelWriter, reader: ChannelReader) -> (ChannelReader, ChannelWriter) {
        (reader, writer)
    }
}

impl Direction for Input {
    type Rt = ChannelWriter;
    type Disk = ChannelReader;
    const IS_OUTPUT: bool = false;

    fn split(writer: ChannelWriter, reader: ChannelReader) -> (ChannelWriter, ChannelReader) {
        (writer, reader)
    }
}

/// State visible to both threads of one stream.
#[derive(Debug, Default)]
pub(crate) struct StreamShared {
    /// Next frame the disk thread will read or has consumed up to.
    pub frame: AtomicU64,
    pub metrics: StreamMetrics,
}

/// Everything a disk thread owns while it runs.
pub(crate) struct DiskContext<D: Direction> {
    pub(crate) name: String,
    pub(crate) channels: Vec<D::Disk>,
    pub(crate) blocks: BlockSemaphore,
    pub(crate) terminate: Arc<AtomicBool>,
    pub(crate) shared: Arc<StreamShared>,
    pub(crate) geometry: StreamGeometry,
}

impl<D: Direction> DiskContext<D> {
    /// Wait for a free block. `false` means the thread must exit.
    pub(crate) fn wait_for_block(&self) -> bool {
        self.blocks.wait(&self.terminate)
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Discard the disk side of every channel and reset the semaphore.
    pub(crate) fn flush(&mut self) {
        for channel in &mut self.channels {
            channel.discard();
        }
        self.blocks.reset(D::IS_OUTPUT);
    }

    pub(crate) fn into_channels(self) -> Vec<D::Disk> {
        self.channels
    }
}

fn allocate<D: Direction>(geometry: &StreamGeometry) -> (Vec<D::Rt>, Vec<D::Disk>) {
    (0..geometry.channels)
        .map(|_| {
            let (writer, reader) = bounded_channel(geometry.capacity_frames());
            D::split(writer, reader)
        })
        .unzip()
}

/// Channels, semaphore and disk thread of one stream.
pub struct StreamBase<D: Direction> {
    name: String,
    config: StreamConfig,
    geometry: StreamGeometry,
    blocks: BlockSemaphore,
    rt: Vec<D::Rt>,
    disk: Option<Vec<D::Disk>>,
    thread: Option<JoinHandle<Vec<D::Disk>>>,
    terminate: Arc<AtomicBool>,
    shared: Arc<StreamShared>,
}

impl<D: Direction> StreamBase<D> {
    pub(crate) fn new(
        name: impl Into<String>,
        config: StreamConfig,
        frame_count: usize,
        channels: usize,
    ) -> Result<Self> {
        config.validate()?;
        if frame_count == 0 || channels == 0 {
            return Err(tapedeck_core::Error::InvalidConfig(format!(
                "stream needs frames and channels, got {frame_count} frames x {channels} channels"
            ))
            .into());
        }

        let geometry = config.geometry(frame_count, channels);
        let (rt, disk) = allocate::<D>(&geometry);
        let initial = if D::IS_OUTPUT {
            geometry.total_blocks
        } else {
            0
        };

        Ok(Self {
            name: name.into(),
            config,
            blocks: BlockSemaphore::new(geometry.total_blocks, initial),
            geometry,
            rt,
            disk: Some(disk),
            thread: None,
            terminate: Arc::new(AtomicBool::new(false)),
            shared: Arc::new(StreamShared::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn geometry(&self) -> StreamGeometry {
        self.geometry
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.shared.metrics
    }

    pub(crate) fn shared(&self) -> &Arc<StreamShared> {
        &self.shared
    }

    pub(crate) fn rt_channels(&self) -> &[D::Rt] {
        &self.rt
    }

    pub(crate) fn rt_channels_mut(&mut self) -> &mut [D::Rt] {
        &mut self.rt
    }

    #[cfg(test)]
    pub(crate) fn disk_channels_mut(&mut self) -> &mut [D::Disk] {
        self.disk.as_deref_mut().unwrap_or_default()
    }

    /// Capacity of each channel in frames.
    pub fn channel_capacities(&self) -> Vec<usize> {
        self.rt.iter().map(ChannelEnd::capacity).collect()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Join a disk thread that already exited, recovering its channels.
    fn reap(&mut self) {
        if self.thread.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join();
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(channels) => self.disk = Some(channels),
                Err(_) => warn!(stream = %self.name, "disk thread panicked"),
            }
        }
    }

    /// Start the disk thread with `body`.
    ///
    /// # Panics
    ///
    /// If the disk thread is already running.
    pub(crate) fn spawn<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&DiskThread, DiskContext<D>) -> Vec<D::Disk> + Send + 'static,
    {
        assert!(
            !self.is_running(),
            "disk thread of {} already running",
            self.name
        );
        self.reap();

        let channels = match self.disk.take() {
            Some(channels) => channels,
            None => {
                // A detached thread kept the old channels and semaphore.
                let (rt, disk) = allocate::<D>(&self.geometry);
                let initial = if D::IS_OUTPUT {
                    self.geometry.total_blocks
                } else {
                    0
                };
                self.rt = rt;
                self.blocks = BlockSemaphore::new(self.geometry.total_blocks, initial);
                disk
            }
        };

        self.terminate = Arc::new(AtomicBool::new(false));
        let context = DiskContext {
            name: self.name.clone(),
            channels,
            blocks: self.blocks.clone(),
            terminate: Arc::clone(&self.terminate),
            shared: Arc::clone(&self.shared),
            geometry: self.geometry,
        };

        debug!(stream = %self.name, "starting disk thread");
        let handle = DiskThread::spawn(self.name.clone(), move |disk| body(disk, context))
            .map_err(Error::Spawn)?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Called once per callback after the real-time side consumed or
    /// produced a block.
    #[inline]
    pub(crate) fn block_processed(&self) {
        self.blocks.post();
    }

    /// Stop the disk thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread.as_ref() else {
            return;
        };

        if !handle.is_finished() {
            debug!(stream = %self.name, "sending terminate to disk thread");
            self.terminate.store(true, Ordering::Release);
            while !handle.is_finished() {
                self.blocks.post();
                thread::sleep(SHUTDOWN_POLL);
            }
        }

        self.join();
        debug!(stream = %self.name, "disk thread joined");
    }

    /// Tell the disk thread to exit without waiting for it.
    pub fn detach(&mut self) {
        if let Some(handle) = self.thread.take() {
            debug!(stream = %self.name, "detaching disk thread");
            self.terminate.store(true, Ordering::Release);
            self.blocks.post();
            drop(handle);
        }
    }

    /// Discard buffered data on both sides. The disk thread must be stopped.
    pub fn flush(&mut self) {
        debug_assert!(!self.is_running(), "flush with a running disk thread");
        self.reap();
        for channel in &mut self.rt {
            channel.discard();
        }
        if let Some(channels) = self.disk.as_mut() {
            for channel in channels {
                channel.discard();
            }
        }
        self.blocks.reset(D::IS_OUTPUT);
    }

    /// Rebuild channels and semaphore for a new callback size. The disk
    /// thread must be stopped.
    pub(crate) fn reallocate(&mut self, frame_count: usize) {
        debug_assert!(!self.is_running(), "reallocate with a running disk thread");
        self.reap();
        self.geometry = self
            .config
            .geometry(frame_count.max(1), self.geometry.channels);
        let (rt, disk) = allocate::<D>(&self.geometry);
        self.rt = rt;
        self.disk = Some(disk);
        self.blocks = BlockSemaphore::new(self.geometry.total_blocks, 0);
    }

    /// Percentage of the buffer available to the real-time side.
    pub fn buffer_percent(&self) -> u32 {
        let total = self.blocks.total();
        let free = self.blocks.value().min(total);
        (100 - free * 100 / total) as u32
    }

    /// Real-time over/underruns so far.
    pub fn xruns(&self) -> u64 {
        self.shared.metrics.xruns()
    }
}

impl<D: Direction> Drop for StreamBase<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Lifecycle shared by playback and capture streams.
pub trait DiskStream {
    type Direction: Direction;

    fn base(&self) -> &StreamBase<Self::Direction>;

    fn base_mut(&mut self) -> &mut StreamBase<Self::Direction>;

    /// Start the disk thread.
    fn run(&mut self) -> Result<()>;

    fn is_running(&self) -> bool {
        self.base().is_running()
    }

    fn shutdown(&mut self) {
        self.base_mut().shutdown();
    }

    fn detach(&mut self) {
        self.base_mut().detach();
    }

    fn flush(&mut self) {
        self.base_mut().flush();
    }

    /// Rebuild buffers for `frame_count`.
    fn reallocate(&mut self, frame_count: usize) {
        self.base_mut().reallocate(frame_count);
    }

    /// Resize for a new callback size, restarting the disk thread if it was
    /// running.
    fn resize_buffers(&mut self, frame_count: usize) -> Result<()> {
        if frame_count == self.base().geometry().frame_count {
            return Ok(());
        }

        debug!(
            stream = %self.base().name(),
            from = self.base().geometry().frame_count,
            to = frame_count,
            "resizing buffers"
        );

        let was_running = self.is_running();
        if was_running {
            self.shutdown();
        }
        self.reallocate(frame_count);
        self.flush();
        if was_running {
            self.run()?;
        }
        Ok(())
    }

    fn buffer_percent(&self) -> u32 {
        self.base().buffer_percent()
    }

    fn xruns(&self) -> u64 {
        self.base().xruns()
    }
}
