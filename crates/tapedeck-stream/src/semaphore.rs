//! Counting semaphore of free blocks.
//!
//! Tokens travel through a bounded channel, so posting never allocates or
//! blocks and the count can never exceed the number of blocks.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often a blocked waiter re-checks its terminate flag.
const WAKE_INTERVAL: Duration = Duration::from_millis(10);

/// Blocks the disk thread may process next.
#[derive(Clone)]
pub struct BlockSemaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
    total: usize,
}

impl BlockSemaphore {
    pub fn new(total: usize, initial: usize) -> Self {
        let total = total.max(1);
        let (tx, rx) = bounded(total);
        let sem = Self { tx, rx, total };
        for _ in 0..initial.min(total) {
            sem.post();
        }
        sem
    }

    /// Release one block. Real-time safe; a post on a full semaphore is
    /// dropped.
    #[inline]
    pub fn post(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// Take one block, waiting until one is posted.
    ///
    /// Returns `false` once `terminate` is set.
    pub fn wait(&self, terminate: &AtomicBool) -> bool {
        loop {
            if terminate.load(Ordering::Acquire) {
                return false;
            }
            match self.rx.recv_timeout(WAKE_INTERVAL) {
                Ok(()) => return !terminate.load(Ordering::Acquire),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Posted blocks not yet taken.
    pub fn value(&self) -> usize {
        self.rx.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Reset to `total` when `full`, else to zero.
    pub fn reset(&self, full: bool) {
        while self.rx.try_recv().is_ok() {}
        if full {
            for _ in 0..self.total {
                if !self.post() {
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for BlockSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSemaphore")
            .field("value", &self.value())
            .field("total", &self.total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_value() {
        let sem = BlockSemaphore::new(8, 8);
        assert_eq!(sem.value(), 8);
        let sem = BlockSemaphore::new(8, 0);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_post_never_exceeds_total() {
        let sem = BlockSemaphore::new(4, 4);
        assert!(!sem.post());
        assert_eq!(sem.value(), 4);
    }

    #[test]
    fn test_reset() {
        let sem = BlockSemaphore::new(6, 2);
        sem.reset(true);
        assert_eq!(sem.value(), 6);
        sem.reset(false);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_wait_takes_token() {
        let sem = BlockSemaphore::new(4, 1);
        let terminate = AtomicBool::new(false);
        assert!(sem.wait(&terminate));
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_wait_returns_false_on_terminate() {
        let sem = BlockSemaphore::new(4, 0);
        let terminate = Arc::new(AtomicBool::new(false));

        let waiter = {
            let sem = sem.clone();
            let terminate = Arc::clone(&terminate);
            thread::spawn(move || sem.wait(&terminate))
        };

        thread::sleep(Duration::from_millis(20));
        terminate.store(true, Ordering::Release);
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_post_wakes_waiter() {
        let sem = BlockSemaphore::new(4, 0);
        let terminate = Arc::new(AtomicBool::new(false));

        let waiter = {
            let sem = sem.clone();
            let terminate = Arc::clone(&terminate);
            thread::spawn(move || sem.wait(&terminate))
        };

        sem.post();
        assert!(waiter.join().unwrap());
    }
}
