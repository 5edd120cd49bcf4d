//! Streams of every track in a session.

use crate::base::DiskStream;
use crate::capture::CaptureStream;
use crate::error::{Error, Result};
use crate::locate::LocateDetector;
use crate::playback::PlaybackStream;
use std::sync::Arc;
use tapedeck_core::{AudioPort, CaptureTrack, Region, RtThread, SequenceSource, Transport};
use tracing::{debug, info};

/// Playback and optional capture stream of one track.
pub struct TrackStreams<S: SequenceSource + ?Sized + 'static, T: CaptureTrack + 'static> {
    pub name: String,
    pub playback: PlaybackStream<S>,
    pub capture: Option<CaptureStream<T>>,
    armed: bool,
}

impl<S: SequenceSource + ?Sized + 'static, T: CaptureTrack + 'static> TrackStreams<S, T> {
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Fans transport operations out to the streams of every track.
pub struct StreamSet<S: SequenceSource + ?Sized + 'static, T: CaptureTrack + 'static> {
    transport: Arc<Transport>,
    locate: LocateDetector,
    tracks: Vec<TrackStreams<S, T>>,
}

impl<S: SequenceSource + ?Sized + 'static, T: CaptureTrack + 'static> StreamSet<S, T> {
    pub fn new(transport: Arc<Transport>) -> Self {
        let locate = LocateDetector::at(transport.frame());
        Self {
            transport,
            locate,
            tracks: Vec::new(),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Add a track. Returns its index.
    pub fn add_track(
        &mut self,
        name: impl Into<String>,
        playback: PlaybackStream<S>,
        capture: Option<CaptureStream<T>>,
    ) -> usize {
        self.tracks.push(TrackStreams {
            name: name.into(),
            playback,
            capture,
            armed: false,
        });
        self.tracks.len() - 1
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Option<&TrackStreams<S, T>> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut TrackStreams<S, T>> {
        self.tracks.get_mut(index)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackStreams<S, T>> {
        self.tracks.iter()
    }

    /// Arm or disarm a track for the next [`record`](Self::record).
    pub fn set_armed(&mut self, index: usize, armed: bool) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.armed = armed && track.capture.is_some();
        }
    }

    /// Start every playback disk thread that is not running.
    pub fn run(&mut self) -> Result<()> {
        for track in &mut self.tracks {
            if !track.playback.is_running() {
                track.playback.run()?;
            }
        }
        Ok(())
    }

    /// Stop every disk thread, finalizing open captures.
    pub fn shutdown(&mut self) {
        for track in &mut self.tracks {
            track.playback.shutdown();
            if let Some(capture) = track.capture.as_mut() {
                capture.shutdown();
            }
        }
        self.transport.set_recording(false);
    }

    pub fn seek(&self, rt: &RtThread, frame: u64) {
        for track in &self.tracks {
            track.playback.seek(rt, frame);
        }
    }

    pub fn undelay(&self, frames: u64) {
        for track in &self.tracks {
            track.playback.undelay(frames);
        }
    }

    /// Rebuild every stream's buffers for a new callback size.
    ///
    /// Must not run concurrently with [`process`](Self::process).
    pub fn resize_buffers(&mut self, frame_count: usize) -> Result<()> {
        debug!(frame_count, tracks = self.tracks.len(), "resizing stream buffers");
        for track in &mut self.tracks {
            track.playback.resize_buffers(frame_count)?;
            if let Some(capture) = track.capture.as_mut() {
                capture.resize_buffers(frame_count)?;
            }
        }
        Ok(())
    }

    /// One engine callback: follow transport jumps, play outputs, capture
    /// inputs, then advance the transport.
    ///
    /// `outputs[i]` and `inputs[i]` hold the ports of track `i`.
    pub fn process<P: AudioPort>(
        &mut self,
        rt: &RtThread,
        outputs: &mut [Vec<P>],
        inputs: &mut [Vec<P>],
        nframes: usize,
    ) {
        if let Some(frame) = self.locate.poll(&self.transport, nframes) {
            self.seek(rt, frame);
        }

        if !self.transport.is_rolling() {
            for port in outputs.iter_mut().flatten() {
                port.buffer(nframes).fill(0.0);
            }
            // a locate while stopped still needs room to refill
            for track in &mut self.tracks {
                track.playback.release_stale(rt);
            }
            return;
        }

        for (track, ports) in self.tracks.iter_mut().zip(outputs.iter_mut()) {
            track.playback.process(rt, ports, nframes);
        }
        let freewheeling = self.transport.is_freewheeling();
        for (track, ports) in self.tracks.iter_mut().zip(inputs.iter_mut()) {
            if let Some(capture) = track.capture.as_mut() {
                capture.set_freewheeling(freewheeling);
                capture.process(rt, ports, nframes);
            }
        }

        self.transport.advance(nframes);
    }

    /// Start capturing on every armed track.
    pub fn record(&mut self, trigger_frame: u64, record_start: u64, record_stop: u64) -> Result<()> {
        let mut started = 0;
        for track in self.tracks.iter_mut().filter(|t| t.armed) {
            if let Some(capture) = track.capture.as_mut() {
                capture.start(trigger_frame, record_start, record_stop)?;
                started += 1;
            }
        }
        info!(tracks = started, record_start, "recording");
        self.transport.set_recording(started > 0);
        Ok(())
    }

    /// Schedule the end of every running capture at `frame`. Returns
    /// without waiting; the disk threads finalize once they get there.
    pub fn stop(&self, frame: u64) -> Result<()> {
        for capture in self.tracks.iter().filter_map(|t| t.capture.as_ref()) {
            if !capture.is_recording() {
                continue;
            }
            match capture.stop(frame) {
                // finished on its own meanwhile
                Ok(()) | Err(Error::NotRecording(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop every capture at `frame` and wait for the regions to be
    /// finalized.
    pub fn punch_out(&mut self, frame: u64) -> Result<()> {
        self.stop(frame)?;
        for capture in self.tracks.iter_mut().filter_map(|t| t.capture.as_mut()) {
            capture.shutdown();
        }
        self.transport.set_recording(false);
        Ok(())
    }

    /// Regions finalized on every track since the last call, by track index.
    pub fn take_regions(&self) -> Vec<(usize, Region)> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(i, track)| track.capture.as_ref().map(|c| (i, c.take_regions())))
            .flat_map(|(i, regions)| regions.into_iter().map(move |r| (i, r)))
            .collect()
    }

    /// Some playback stream is less than half full.
    pub fn seek_pending(&self) -> bool {
        self.tracks
            .iter()
            .any(|track| track.playback.buffer_percent() < 50)
    }

    /// Average fill of the playback streams.
    pub fn output_buffer_percent(&self) -> u32 {
        average(self.tracks.iter().map(|t| t.playback.buffer_percent()))
    }

    /// Average fill of the capture streams.
    pub fn input_buffer_percent(&self) -> u32 {
        average(
            self.tracks
                .iter()
                .filter_map(|t| t.capture.as_ref().map(|c| c.buffer_percent())),
        )
    }

    /// Real-time xruns over every stream.
    pub fn xruns(&self) -> u64 {
        self.tracks
            .iter()
            .map(|t| t.playback.xruns() + t.capture.as_ref().map_or(0, |c| c.xruns()))
            .sum()
    }
}

fn average(values: impl Iterator<Item = u32>) -> u32 {
    let (sum, count) = values.fold((0, 0), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0
    } else {
        sum / count
    }
}
