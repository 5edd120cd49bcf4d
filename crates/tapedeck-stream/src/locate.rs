//! Transport jump detection for the real-time thread.

use tapedeck_core::Transport;

/// Tracks where the transport should be on the next callback.
///
/// Call [`poll`](Self::poll) at the top of every callback, before the
/// transport is advanced. A reported frame means playback streams must
/// `seek()` before they `process()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocateDetector {
    expected: u64,
}

impl LocateDetector {
    /// Detector for streams positioned at frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector for streams positioned at `frame`.
    pub fn at(frame: u64) -> Self {
        Self { expected: frame }
    }

    /// Returns the new position if the transport jumped since the last call.
    #[inline]
    pub fn poll(&mut self, transport: &Transport, nframes: usize) -> Option<u64> {
        let frame = transport.frame();
        let jumped = frame != self.expected;
        self.expected = if transport.is_rolling() {
            frame + nframes as u64
        } else {
            frame
        };
        jumped.then_some(frame)
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }
}
