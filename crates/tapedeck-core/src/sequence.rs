//! Playback sources.

use crate::thread::DiskThread;

/// Source of interleaved audio for a playback stream.
///
/// Called only from a disk-service thread, under the timeline read lock.
pub trait SequenceSource: Send + Sync {
    /// Mix `frames` frames starting at timeline frame `start` into `buf`.
    ///
    /// `buf` is interleaved with `channels` channels and already zeroed.
    /// Returns the number of frames from `start` up to the end of the last
    /// frame any material was mixed into (0 = nothing there).
    fn play(
        &self,
        disk: &DiskThread,
        buf: &mut [f32],
        start: u64,
        frames: usize,
        channels: usize,
    ) -> usize;
}

/// Interleaved audio placed at a timeline position.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Timeline frame of the first sample
    pub position: u64,
    pub channels: usize,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl Clip {
    pub fn new(position: u64, channels: usize, samples: Vec<f32>) -> Self {
        assert!(channels > 0, "clip needs at least one channel");
        Self {
            position,
            channels,
            samples,
        }
    }

    /// Build a clip from per-channel buffers of equal length.
    pub fn from_channels(position: u64, channels: &[Vec<f32>]) -> Self {
        let frames = channels.first().map_or(0, Vec::len);
        let mut samples = Vec::with_capacity(frames * channels.len());
        for i in 0..frames {
            for channel in channels {
                samples.push(channel[i]);
            }
        }
        Self::new(position, channels.len().max(1), samples)
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn end(&self) -> u64 {
        self.position + self.frames() as u64
    }
}

/// In-memory sequence of clips. Overlapping clips are summed.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    clips: Vec<Clip>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_clip(&mut self, clip: Clip) {
        self.clips.push(clip);
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clear(&mut self) {
        self.clips.clear();
    }

    /// Frame one past the end of the last clip.
    pub fn length(&self) -> u64 {
        self.clips.iter().map(Clip::end).max().unwrap_or(0)
    }

    fn mix_into(&self, buf: &mut [f32], start: u64, frames: usize, channels: usize) -> usize {
        let end = start + frames as u64;
        let mut produced = 0;

        for clip in &self.clips {
            let from = clip.position.max(start);
            let to = clip.end().min(end);
            if from >= to {
                continue;
            }

            for frame in from..to {
                let src = (frame - clip.position) as usize * clip.channels;
                let dst = (frame - start) as usize * channels;
                for ch in 0..channels.min(clip.channels) {
                    buf[dst + ch] += clip.samples[src + ch];
                }
            }

            produced = produced.max((to - start) as usize);
        }

        produced
    }
}

impl SequenceSource for Sequence {
    fn play(
        &self,
        _disk: &DiskThread,
        buf: &mut [f32],
        start: u64,
        frames: usize,
        channels: usize,
    ) -> usize {
        debug_assert!(buf.len() >= frames * channels);
        self.mix_into(buf, start, frames, channels)
    }
}
