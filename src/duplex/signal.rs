//! One-shot close signal.
//!
//! Poll-based readers and writers park their wakers here so a close from
//! another task unblocks them; async waiters use [`CloseSignal::fired`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

use futures_util::task::AtomicWaker;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct CloseSignal {
    fired: AtomicBool,
    notify: Notify,
    reader: AtomicWaker,
    writer: AtomicWaker,
}

impl CloseSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub(crate) fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        self.reader.wake();
        self.writer.wake();
        true
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Register the waker of a pending read.
    pub(crate) fn register_reader(&self, waker: &Waker) {
        self.reader.register(waker);
    }

    /// Register the waker of a pending write.
    pub(crate) fn register_writer(&self, waker: &Waker) {
        self.writer.register(waker);
    }

    /// Resolve once the signal has fired.
    pub(crate) async fn fired(&self) {
        let notified = self.notify.notified();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fires_exactly_once() {
        let signal = CloseSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn wakes_async_waiters() {
        let signal = Arc::new(CloseSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.fired().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();

        // Already fired: resolves immediately.
        tokio::time::timeout(Duration::from_millis(50), signal.fired())
            .await
            .unwrap();
    }
}
