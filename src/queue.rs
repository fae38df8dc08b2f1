//! Bounded MPSC-ish queues with try-push overflow semantics.
//!
//! Carries a single record type from one or more producers to a single
//! consumer. `try_push` never blocks: on overflow the oldest or the new
//! record is dropped per the configured [`OverflowPolicy`], and an overflow
//! counter is incremented. The one blocking operation is
//! [`BoundedQueue::blocking_pop`], which a worker uses as its suspension
//! point; it still wakes on a bounded timeout so cooperative shutdown stays
//! bounded.
//!
//! Lock/drain/unlock: a short critical section pushes or pops against the
//! backing deque and releases the lock before any slow path runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// What to do when a bounded queue is full and a new record arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room for the new one.
    DropOldest,
    /// Discard the incoming record, keeping the queue as-is.
    DropNewest,
}

struct Inner<T> {
    buf: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    overflow_count: AtomicU64,
}

/// A single-record-type bounded queue with configurable overflow behavior.
pub struct BoundedQueue<T> {
    inner: Inner<T>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be > 0");
        Self {
            inner: Inner {
                buf: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                capacity,
                policy,
                overflow_count: AtomicU64::new(0),
            },
        }
    }

    /// Pushes a record without blocking. Returns `true` if the record was
    /// queued as-is, `false` if an overflow occurred (a record, old or new
    /// per policy, was dropped).
    pub fn try_push(&self, value: T) -> bool {
        let mut buf = self.inner.buf.lock().unwrap();
        let accepted = if buf.len() < self.inner.capacity {
            buf.push_back(value);
            true
        } else {
            self.inner.overflow_count.fetch_add(1, Ordering::Relaxed);
            match self.inner.policy {
                OverflowPolicy::DropOldest => {
                    buf.pop_front();
                    buf.push_back(value);
                    false
                }
                OverflowPolicy::DropNewest => false,
            }
        };
        drop(buf);
        if accepted || matches!(self.inner.policy, OverflowPolicy::DropOldest) {
            self.inner.not_empty.notify_one();
        }
        accepted
    }

    /// Pops one record, blocking up to `timeout` for one to arrive. Returns
    /// `None` on timeout so callers can recheck a stop flag (the engine's
    /// only non-retry-executor suspension point).
    pub fn blocking_pop(&self, timeout: Duration) -> Option<T> {
        let mut buf = self.inner.buf.lock().unwrap();
        if buf.is_empty() {
            let (guard, _result) = self
                .inner
                .not_empty
                .wait_timeout_while(buf, timeout, |b| b.is_empty())
                .unwrap();
            buf = guard;
        }
        buf.pop_front()
    }

    /// Non-blocking pop; `None` if the queue is currently empty.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.buf.lock().unwrap().pop_front()
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.inner.buf.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of records dropped due to overflow since creation.
    pub fn overflow_count(&self) -> u64 {
        self.inner.overflow_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_newest_discards_incoming() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2, OverflowPolicy::DropNewest);
        assert!(q.try_push(1));
        assert!(q.try_push(2));
        assert!(!q.try_push(3));
        assert_eq!(q.overflow_count(), 1);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2, OverflowPolicy::DropOldest);
        assert!(q.try_push(1));
        assert!(q.try_push(2));
        assert!(!q.try_push(3));
        assert_eq!(q.overflow_count(), 1);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
    }

    #[test]
    fn blocking_pop_times_out_when_empty() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4, OverflowPolicy::DropNewest);
        assert_eq!(q.blocking_pop(Duration::from_millis(20)), None);
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        use std::sync::Arc;
        use std::thread;

        let q: Arc<BoundedQueue<i32>> = Arc::new(BoundedQueue::new(4, OverflowPolicy::DropNewest));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.blocking_pop(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(30));
        q.try_push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }
}
