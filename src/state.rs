//! Shared event state — detection flag, liveness gate, wait channel.
//!
//! Two execution domains touch this state: the edge handler (restricted,
//! non-blocking) and device operations (blocking/process side). Both flags
//! are atomics with acquire/release ordering; the wait channel is a
//! [`tokio::sync::Notify`], whose `notify_waiters` is safe to call from the
//! restricted side.
//!
//! Writer discipline:
//! - the edge handler is the only writer of the detection flag to `true`
//! - `read` is the only writer of the detection flag to `false`
//! - `write` is the only writer of the liveness gate

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Single-slot, coalescing detection state plus the consumer liveness gate.
///
/// The detection flag means "at least one unconsumed event occurred"; edges
/// arriving between reads collapse into one reported event.
pub struct EventState {
    detected: AtomicBool,
    consumer_live: AtomicBool,
    waitq: Notify,
}

impl EventState {
    /// Fresh state: no pending event, liveness gate closed.
    pub fn new() -> Self {
        Self {
            detected: AtomicBool::new(false),
            consumer_live: AtomicBool::new(false),
            waitq: Notify::new(),
        }
    }

    /// Record a detection and wake every waiter. Non-blocking; callable
    /// from the edge handler.
    pub fn record_detection(&self) {
        self.detected.store(true, Ordering::Release);
        self.waitq.notify_waiters();
    }

    /// Consume the pending event, returning whether one was present. Always
    /// clears the flag, even when it was already clear.
    pub fn consume(&self) -> bool {
        self.detected.swap(false, Ordering::AcqRel)
    }

    /// Non-destructive snapshot of the detection flag (the `poll` path).
    pub fn is_detected(&self) -> bool {
        self.detected.load(Ordering::Acquire)
    }

    pub fn consumer_live(&self) -> bool {
        self.consumer_live.load(Ordering::Acquire)
    }

    pub fn set_consumer_live(&self, live: bool) {
        self.consumer_live.store(live, Ordering::Release);
    }

    /// Suspend until the detection flag is set. Does not consume the event;
    /// timeouts are the caller's concern.
    pub async fn wait_detected(&self) {
        loop {
            // Register on the wait queue before checking the flag, so an
            // edge between the check and the await is not lost.
            let notified = self.waitq.notified();
            if self.is_detected() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for EventState {
    fn default() -> Self {
        Self::new()
    }
}
