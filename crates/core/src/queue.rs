use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, time::Duration};

/// Blocking FIFO hand-off queue between a producer and one consumer thread.
///
/// Producers push under the mutex and notify the condvar; the consumer waits
/// with a bounded timeout so it can periodically re-check its run condition.
/// FIFO order is guaranteed by the single mutex: frames leave in exactly the
/// order they entered.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use lumen_core::prelude::FrameQueue;
///
/// let queue = FrameQueue::new();
/// queue.push(42u8);
/// assert_eq!(queue.wait_pop(Duration::from_millis(10)), Some(42));
/// assert_eq!(queue.wait_pop(Duration::from_millis(10)), None);
/// ```
pub struct FrameQueue<T> {
    inner: Mutex<VecDeque<T>>,
    cond: Condvar,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    /// Append a value and wake the consumer.
    pub fn push(&self, value: T) {
        let mut guard = self.inner.lock();
        guard.push_back(value);
        self.cond.notify_all();
    }

    /// Pop the oldest value, waiting up to `timeout` if the queue is empty.
    ///
    /// Returns `None` on timeout or when woken without data; the caller is
    /// expected to re-check its run condition and call again.
    pub fn wait_pop(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.inner.lock();
        if guard.is_empty() {
            self.cond.wait_for(&mut guard, timeout);
        }
        guard.pop_front()
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Wake any waiting consumer without pushing data.
    ///
    /// Used on shutdown so the consumer notices a status change before the
    /// wait timeout elapses.
    pub fn notify_all(&self) {
        let _guard = self.inner.lock();
        self.cond.notify_all();
    }

    /// Drop all queued values.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
