//! Bounded single-producer/single-consumer sample channels.
//!
//! One channel carries one audio channel between the real-time thread and a
//! disk thread. Either end may discard what it has seen so far without
//! touching the other end's state: a discard mark in shared memory tells the
//! reader how many frames to drop before its next read.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ChannelShared {
    /// Frames up to this total-written count are stale.
    discard_until: AtomicU64,
}

/// Create a channel holding `capacity` samples.
pub fn bounded_channel(capacity: usize) -> (ChannelWriter, ChannelReader) {
    let (prod, cons) = HeapRb::<f32>::new(capacity.max(1)).split();
    let shared = Arc::new(ChannelShared::default());
    (
        ChannelWriter {
            prod,
            shared: Arc::clone(&shared),
            written: 0,
        },
        ChannelReader {
            cons,
            shared,
            read: 0,
        },
    )
}

/// Either end of a channel.
pub trait ChannelEnd: Send {
    fn capacity(&self) -> usize;

    /// Drop everything this end has exchanged so far.
    fn discard(&mut self);
}

/// Producer end.
pub struct ChannelWriter {
    prod: HeapProd<f32>,
    shared: Arc<ChannelShared>,
    written: u64,
}

impl ChannelWriter {
    #[inline]
    pub fn write_space(&self) -> usize {
        self.prod.vacant_len()
    }

    /// Write as many samples as fit. Returns samples written.
    #[inline]
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let n = self.prod.push_slice(samples);
        self.written += n as u64;
        n
    }

    /// Total samples ever written.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl ChannelEnd for ChannelWriter {
    fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }

    /// Mark everything written so far as stale. The reader drops it before
    /// its next read.
    fn discard(&mut self) {
        self.shared
            .discard_until
            .store(self.written, Ordering::Release);
    }
}

/// Consumer end.
pub struct ChannelReader {
    cons: HeapCons<f32>,
    shared: Arc<ChannelShared>,
    read: u64,
}

impl ChannelReader {
    /// Samples behind the discard mark that are still buffered.
    #[inline]
    pub fn stale(&self) -> usize {
        let mark = self.shared.discard_until.load(Ordering::Acquire);
        mark.saturating_sub(self.read) as usize
    }

    /// Drop everything behind the discard mark. Returns samples dropped.
    #[inline]
    pub fn skip_stale(&mut self) -> usize {
        let stale = self.stale();
        if stale == 0 {
            return 0;
        }
        let n = self.cons.skip(stale);
        self.read += n as u64;
        n
    }

    /// Samples buffered, stale ones included.
    #[inline]
    pub fn occupied(&self) -> usize {
        self.cons.occupied_len()
    }

    /// Samples readable, excluding stale ones.
    #[inline]
    pub fn available(&self) -> usize {
        self.occupied().saturating_sub(self.stale())
    }

    /// Fill `out` completely or read nothing.
    ///
    /// Does not look at the discard mark; call [`skip_stale`](Self::skip_stale)
    /// first.
    #[inline]
    pub fn read(&mut self, out: &mut [f32]) -> bool {
        if self.cons.occupied_len() < out.len() {
            return false;
        }
        let n = self.cons.pop_slice(out);
        self.read += n as u64;
        true
    }

    /// Drop every buffered sample. Returns samples dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.cons.clear();
        self.read += dropped as u64;
        dropped
    }
}

impl ChannelEnd for ChannelReader {
    fn capacity(&self) -> usize {
        self.cons.capacity().get()
    }

    fn discard(&mut self) {
        self.clear();
    }
}
