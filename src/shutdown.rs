//! Cooperative cancellation shared by a pipeline's worker threads
//!
//! A running flag for loop checks plus a channel whose sender is dropped
//! on shutdown, which wakes every thread blocked in `select!` or
//! `recv_timeout` on it.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Inner {
    running: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cloneable stop signal
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(true),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.trigger.lock().take();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Receiver that disconnects once shutdown is triggered
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleep for `duration` unless shutdown is triggered first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        matches!(
            self.inner.signal.recv_timeout(duration),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
