//! Audio port abstraction seen by the real-time callback.

/// A mono audio port.
///
/// Only the real-time thread touches port buffers.
pub trait AudioPort {
    /// Buffer for the current callback, at least `frames` long.
    fn buffer(&mut self, frames: usize) -> &mut [f32];
}

/// Port backed by an owned buffer, sized once up front.
#[derive(Debug, Clone, Default)]
pub struct PortBuffer {
    samples: Vec<f32>,
}

impl PortBuffer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            samples: vec![0.0; max_frames],
        }
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}

impl AudioPort for PortBuffer {
    #[inline]
    fn buffer(&mut self, frames: usize) -> &mut [f32] {
        assert!(
            frames <= self.samples.len(),
            "port holds {} frames, callback asked for {}",
            self.samples.len(),
            frames
        );
        &mut self.samples[..frames]
    }
}
