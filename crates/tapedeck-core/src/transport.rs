//! Transport position shared between the UI, engine and streams.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lock-free transport state.
///
/// The engine advances the frame once per callback; any thread may read it.
#[derive(Debug, Default)]
pub struct Transport {
    frame: AtomicU64,
    rolling: AtomicBool,
    loop_enabled: AtomicBool,
    punch_enabled: AtomicBool,
    recording: AtomicBool,
    freewheeling: AtomicBool,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Jump to a frame (locate).
    pub fn locate(&self, frame: u64) {
        self.frame.store(frame, Ordering::Release);
    }

    /// Advance by one callback. Called by the engine after processing.
    #[inline]
    pub fn advance(&self, frames: usize) {
        if self.is_rolling() {
            self.frame.fetch_add(frames as u64, Ordering::AcqRel);
        }
    }

    #[inline]
    pub fn is_rolling(&self) -> bool {
        self.rolling.load(Ordering::Acquire)
    }

    pub fn play(&self) {
        self.rolling.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.rolling.store(false, Ordering::Release);
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled.load(Ordering::Relaxed)
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.loop_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn punch_enabled(&self) -> bool {
        self.punch_enabled.load(Ordering::Relaxed)
    }

    pub fn set_punch_enabled(&self, enabled: bool) {
        self.punch_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    /// Running faster than real time (offline render).
    pub fn is_freewheeling(&self) -> bool {
        self.freewheeling.load(Ordering::Acquire)
    }

    pub fn set_freewheeling(&self, freewheeling: bool) {
        self.freewheeling.store(freewheeling, Ordering::Release);
    }
}
