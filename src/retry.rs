//! Retry/backoff executor for outbound operations (e.g. handing a collection
//! payload to the cloud transport).
//!
//! Exponential backoff with a clamp, looped until success or abort, run on
//! a blocking `std::thread` rather than an async task since this crate's
//! concurrency model is thread-based, not async. Sleep is interruptible via
//! a `Condvar` pair so `stop()` doesn't wait out a full backoff interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// Result of one attempt at the retryable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retry,
    Abort,
}

/// A unit of work the executor drives to completion (or abort).
pub trait Retryable: Send {
    /// Performs one attempt, returning whether it succeeded, should be
    /// retried, or should be abandoned outright.
    fn attempt(&mut self) -> Outcome;

    /// Called once after the run concludes, with the final outcome
    /// (`Success` or `Abort`, never `Retry`).
    fn on_finished(&mut self, outcome: Outcome) {
        let _ = outcome;
    }
}

/// Exponential backoff with a saturating doubling, clamped to `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub start: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(start: Duration, max: Duration) -> Self {
        Self { start, max }
    }

    /// Returns the next interval after `current`, doubling but never
    /// exceeding `max` (and never overflowing `Duration`).
    fn next(&self, current: Duration) -> Duration {
        current.checked_mul(2).unwrap_or(self.max).min(self.max)
    }
}

struct StopSignal {
    lock: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            lock: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    fn signal(&self) {
        let mut stopped = self.lock.lock().unwrap();
        *stopped = true;
        self.cvar.notify_all();
    }

    /// Sleeps up to `dur`, waking early if `signal()` is called. Returns
    /// `true` if woken by a stop signal.
    fn sleep(&self, dur: Duration) -> bool {
        let stopped = self.lock.lock().unwrap();
        let (guard, _result) = self
            .cvar
            .wait_timeout_while(stopped, dur, |s| !*s)
            .unwrap();
        *guard
    }

    fn is_stopped(&self) -> bool {
        *self.lock.lock().unwrap()
    }
}

/// Drives a [`Retryable`] on a dedicated background thread until it
/// succeeds, aborts, or is stopped.
pub struct RetryExecutor {
    backoff: Backoff,
    running: Arc<AtomicBool>,
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl RetryExecutor {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(StopSignal::new()),
            handle: None,
        }
    }

    /// True while a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts driving `task` on a background thread. Returns
    /// [`Error::AlreadyRunning`] if a previous run hasn't finished yet;
    /// starting is rejected outright, never queued.
    pub fn start<T>(&mut self, mut task: T) -> Result<()>
    where
        T: Retryable + 'static,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        let backoff = self.backoff;
        let running = self.running.clone();
        self.stop = Arc::new(StopSignal::new());
        let stop = self.stop.clone();

        let handle = thread::spawn(move || {
            let mut interval = backoff.start;
            let outcome = loop {
                if stop.is_stopped() {
                    break Outcome::Abort;
                }
                match task.attempt() {
                    Outcome::Success => break Outcome::Success,
                    Outcome::Abort => break Outcome::Abort,
                    Outcome::Retry => {
                        if stop.sleep(interval) {
                            break Outcome::Abort;
                        }
                        interval = backoff.next(interval);
                    }
                }
            };
            task.on_finished(outcome);
            running.store(false, Ordering::Release);
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Requests the running task stop at its next check point and wakes any
    /// in-progress backoff sleep immediately. Idempotent.
    pub fn stop(&mut self) {
        self.stop.signal();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RetryExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct CountingTask {
        fail_times: u32,
        attempts: u32,
        done_tx: mpsc::Sender<Outcome>,
    }

    impl Retryable for CountingTask {
        fn attempt(&mut self) -> Outcome {
            self.attempts += 1;
            if self.attempts <= self.fail_times {
                Outcome::Retry
            } else {
                Outcome::Success
            }
        }

        fn on_finished(&mut self, outcome: Outcome) {
            let _ = self.done_tx.send(outcome);
        }
    }

    #[test]
    fn succeeds_after_retries() {
        let (tx, rx) = mpsc::channel();
        let mut exec = RetryExecutor::new(Backoff::new(
            Duration::from_millis(5),
            Duration::from_millis(20),
        ));
        exec.start(CountingTask {
            fail_times: 2,
            attempts: 0,
            done_tx: tx,
        })
        .unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn start_rejected_while_running() {
        let (tx, _rx) = mpsc::channel();
        let mut exec = RetryExecutor::new(Backoff::new(
            Duration::from_millis(200),
            Duration::from_millis(500),
        ));
        exec.start(CountingTask {
            fail_times: 100,
            attempts: 0,
            done_tx: tx.clone(),
        })
        .unwrap();
        let err = exec
            .start(CountingTask {
                fail_times: 0,
                attempts: 0,
                done_tx: tx,
            })
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning));
        exec.stop();
    }

    #[test]
    fn stop_interrupts_backoff_sleep() {
        let (tx, rx) = mpsc::channel();
        let mut exec = RetryExecutor::new(Backoff::new(
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));
        exec.start(CountingTask {
            fail_times: 100,
            attempts: 0,
            done_tx: tx,
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        exec.stop();
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(outcome, Outcome::Abort);
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let b = Backoff::new(Duration::from_millis(10), Duration::from_millis(35));
        let a = b.next(Duration::from_millis(10));
        assert_eq!(a, Duration::from_millis(20));
        let c = b.next(a);
        assert_eq!(c, Duration::from_millis(35));
        let d = b.next(c);
        assert_eq!(d, Duration::from_millis(35));
    }
}
