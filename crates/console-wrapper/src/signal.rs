//! One-shot completion latches
//!
//! A `CompletionSignal` lets a caller block on an asynchronous milestone
//! (first output line, first error line, exit, kill) instead of registering
//! an observer. Setting is sticky and idempotent; waiting after the signal
//! is set returns immediately.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::{Receiver, Sender, bounded};

/// A one-shot latch for an asynchronous milestone
#[derive(Debug)]
pub struct CompletionSignal {
    set: AtomicBool,
    gate: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl CompletionSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(1);
        Self {
            set: AtomicBool::new(false),
            gate: Mutex::new(Some(tx)),
            done: rx,
        }
    }

    /// Mark the milestone as reached; sticky and idempotent
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
        // dropping the sender closes the channel, waking every waiter
        self.gate.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Unblock all waiters without marking the milestone reached
    ///
    /// Used by dispose so nobody blocks forever on a signal that can no
    /// longer fire.
    pub(crate) fn release(&self) {
        self.gate.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Whether the milestone has been reached
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Wait until the milestone is reached (or the signal is released)
    pub async fn wait(&self) {
        if self.is_set() {
            return;
        }
        // recv fails once the channel closes, which is exactly the wake-up
        let _ = self.done.recv().await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The four milestones a wrapper exposes
#[derive(Debug, Default)]
pub(crate) struct WrapperSignals {
    pub output_received: CompletionSignal,
    pub error_received: CompletionSignal,
    pub exited: CompletionSignal,
    pub killed: CompletionSignal,
}

impl WrapperSignals {
    /// Unblock every waiter; called on dispose
    pub fn release_all(&self) {
        self.output_received.release();
        self.error_received.release();
        self.exited.release();
        self.killed.release();
    }
}
