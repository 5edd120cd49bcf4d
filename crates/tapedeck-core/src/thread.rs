//! Thread-role tokens.
//!
//! Functions that may only run on one side of the real-time/disk split take a
//! token by reference. A [`DiskThread`] exists only inside the body of a thread
//! started with [`DiskThread::spawn`], and neither token is `Send`, so a token
//! cannot leak to a thread of the other role.

use std::cell::Cell;
use std::marker::PhantomData;
use std::thread::{self, JoinHandle};

/// Role of the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadRole {
    #[default]
    Other,
    /// Audio callback thread
    Realtime,
    /// Disk-service thread of a stream
    Disk,
}

thread_local! {
    static ROLE: Cell<ThreadRole> = const { Cell::new(ThreadRole::Other) };
}

impl ThreadRole {
    pub fn current() -> Self {
        ROLE.with(Cell::get)
    }

    fn set(role: ThreadRole) {
        ROLE.with(|r| r.set(role));
    }
}

type NotSend = PhantomData<*const ()>;

/// Capability of the audio callback thread.
#[derive(Debug)]
pub struct RtThread {
    _marker: NotSend,
}

impl RtThread {
    /// Mark the calling thread as the real-time thread and get its token.
    ///
    /// Call once at the top of each audio callback.
    #[inline]
    pub fn enter() -> Self {
        debug_assert_ne!(
            ThreadRole::current(),
            ThreadRole::Disk,
            "real-time token requested on a disk thread"
        );
        ThreadRole::set(ThreadRole::Realtime);
        Self {
            _marker: PhantomData,
        }
    }
}

/// Capability of a disk-service thread.
#[derive(Debug)]
pub struct DiskThread {
    _marker: NotSend,
}

impl DiskThread {
    /// Spawn a named disk-service thread running `body` with its token.
    pub fn spawn<F, T>(name: impl Into<String>, body: F) -> std::io::Result<JoinHandle<T>>
    where
        F: FnOnce(&DiskThread) -> T + Send + 'static,
        T: Send + 'static,
    {
        thread::Builder::new().name(name.into()).spawn(move || {
            ThreadRole::set(ThreadRole::Disk);
            let token = DiskThread {
                _marker: PhantomData,
            };
            body(&token)
        })
    }
}
