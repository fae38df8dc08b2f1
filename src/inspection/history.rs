//! Per-signal inspection history: a bounded, time-ordered ring of samples
//! supporting the evaluator's window queries.
//!
//! Fixed-capacity, evict-oldest-on-overflow ring, walked from the back for
//! aggregates, carrying `(Timestamp, SignalValue, SignalType)` triples sized
//! by the larger of a time window and a sample-count window, with
//! out-of-order rejection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{SignalType, SignalValue, Timestamp};

#[derive(Debug, Clone)]
struct Sample {
    timestamp: Timestamp,
    value: SignalValue,
    signal_type: SignalType,
}

/// Per-signal ring buffer of `(timestamp, value)` samples, non-decreasing
/// in timestamp (equal timestamps are accepted).
#[derive(Debug)]
pub struct SignalHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
    time_window_ms: u64,
    out_of_order_drops: AtomicU64,
}

impl SignalHistory {
    /// `capacity` is the larger of the worst-case sample count implied by
    /// `time_window_ms` at the observed max ingestion rate and the largest
    /// sample-count window referencing this signal.
    pub fn new(capacity: usize, time_window_ms: u64) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            time_window_ms,
            out_of_order_drops: AtomicU64::new(0),
        }
    }

    /// Ingests one sample carrying its declared type. Rejects
    /// `timestamp < last.timestamp`; accepts equal timestamps. Evicts
    /// entries now older than the configured time window.
    pub fn push(&mut self, timestamp: Timestamp, value: SignalValue, signal_type: SignalType) {
        if let Some(last) = self.samples.back() {
            if timestamp < last.timestamp {
                self.out_of_order_drops.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.samples.push_back(Sample {
            timestamp,
            value,
            signal_type,
        });

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        if let Some(newest) = self.samples.back().map(|s| s.timestamp) {
            let cutoff = newest.0.saturating_sub(self.time_window_ms);
            while let Some(oldest) = self.samples.front() {
                if oldest.timestamp.0 < cutoff {
                    self.samples.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    pub fn out_of_order_drops(&self) -> u64 {
        self.out_of_order_drops.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Most recent value, `None` if no sample has ever arrived.
    pub fn latest(&self) -> Option<&SignalValue> {
        self.samples.back().map(|s| &s.value)
    }

    /// Second-most-recent value.
    pub fn previous(&self) -> Option<&SignalValue> {
        let len = self.samples.len();
        if len < 2 {
            return None;
        }
        self.samples.get(len - 2).map(|s| &s.value)
    }

    /// True if any sample has arrived at or after `since`.
    pub fn has_seen_since(&self, since: Timestamp) -> bool {
        self.samples.iter().rev().any(|s| s.timestamp >= since)
    }

    /// The last `n` samples (oldest first), for assembling a collection
    /// frame's windowed payload.
    pub fn samples_last_n(&self, n: usize) -> Vec<(Timestamp, SignalValue, SignalType)> {
        let len = self.samples.len();
        let skip = len.saturating_sub(n);
        self.samples
            .iter()
            .skip(skip)
            .map(|s| (s.timestamp, s.value.clone(), s.signal_type))
            .collect()
    }

    /// All samples at or after `since` (oldest first).
    pub fn samples_since(&self, since: Timestamp) -> Vec<(Timestamp, SignalValue, SignalType)> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= since)
            .map(|s| (s.timestamp, s.value.clone(), s.signal_type))
            .collect()
    }

    fn last_n_numeric(&self, n: usize) -> Vec<f64> {
        self.samples
            .iter()
            .rev()
            .take(n)
            .filter_map(|s| s.value.as_f64())
            .collect()
    }

    fn since_numeric(&self, since: Timestamp) -> Vec<f64> {
        self.samples
            .iter()
            .rev()
            .take_while(|s| s.timestamp >= since)
            .filter_map(|s| s.value.as_f64())
            .collect()
    }

    pub fn min_last_n(&self, n: usize) -> Option<f64> {
        self.last_n_numeric(n).into_iter().reduce(f64::min)
    }

    pub fn max_last_n(&self, n: usize) -> Option<f64> {
        self.last_n_numeric(n).into_iter().reduce(f64::max)
    }

    pub fn sum_last_n(&self, n: usize) -> f64 {
        self.last_n_numeric(n).into_iter().sum()
    }

    pub fn count_last_n(&self, n: usize) -> usize {
        self.last_n_numeric(n).len()
    }

    pub fn avg_last_n(&self, n: usize) -> Option<f64> {
        let values = self.last_n_numeric(n);
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn min_since(&self, since: Timestamp) -> Option<f64> {
        self.since_numeric(since).into_iter().reduce(f64::min)
    }

    pub fn max_since(&self, since: Timestamp) -> Option<f64> {
        self.since_numeric(since).into_iter().reduce(f64::max)
    }

    pub fn sum_since(&self, since: Timestamp) -> f64 {
        self.since_numeric(since).into_iter().sum()
    }

    pub fn count_since(&self, since: Timestamp) -> usize {
        self.since_numeric(since).len()
    }

    pub fn avg_since(&self, since: Timestamp) -> Option<f64> {
        let values = self.since_numeric(since);
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_sample_is_dropped() {
        let mut h = SignalHistory::new(10, 10_000);
        h.push(Timestamp(100), SignalValue::Double(1.0), SignalType::Double);
        h.push(Timestamp(50), SignalValue::Double(2.0), SignalType::Double);
        assert_eq!(h.out_of_order_drops(), 1);
        assert_eq!(h.latest(), Some(&SignalValue::Double(1.0)));
    }

    #[test]
    fn equal_timestamp_is_accepted() {
        let mut h = SignalHistory::new(10, 10_000);
        h.push(Timestamp(100), SignalValue::Double(1.0), SignalType::Double);
        h.push(Timestamp(100), SignalValue::Double(2.0), SignalType::Double);
        assert_eq!(h.out_of_order_drops(), 0);
        assert_eq!(h.latest(), Some(&SignalValue::Double(2.0)));
    }

    #[test]
    fn latest_and_previous() {
        let mut h = SignalHistory::new(10, 10_000);
        assert_eq!(h.latest(), None);
        assert_eq!(h.previous(), None);
        h.push(Timestamp(1), SignalValue::Double(1.0), SignalType::Double);
        assert_eq!(h.previous(), None);
        h.push(Timestamp(2), SignalValue::Double(2.0), SignalType::Double);
        assert_eq!(h.latest(), Some(&SignalValue::Double(2.0)));
        assert_eq!(h.previous(), Some(&SignalValue::Double(1.0)));
    }

    #[test]
    fn count_window_evicts_oldest() {
        let mut h = SignalHistory::new(3, 1_000_000);
        for i in 0..5 {
            h.push(Timestamp(i), SignalValue::Double(i as f64), SignalType::Double);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.min_last_n(10), Some(2.0));
        assert_eq!(h.max_last_n(10), Some(4.0));
    }

    #[test]
    fn time_window_evicts_aged_entries() {
        let mut h = SignalHistory::new(100, 50);
        h.push(Timestamp(0), SignalValue::Double(1.0), SignalType::Double);
        h.push(Timestamp(200), SignalValue::Double(2.0), SignalType::Double);
        // newest=200, cutoff=150; the t=0 sample is now older than the window.
        assert_eq!(h.len(), 1);
        assert_eq!(h.latest(), Some(&SignalValue::Double(2.0)));
    }

    #[test]
    fn aggregates_over_last_n() {
        let mut h = SignalHistory::new(10, 100_000);
        for v in [1.0, 2.0, 3.0, 4.0] {
            h.push(Timestamp(v as u64), SignalValue::Double(v), SignalType::Double);
        }
        assert_eq!(h.sum_last_n(2), 7.0);
        assert_eq!(h.avg_last_n(4), Some(2.5));
        assert_eq!(h.count_last_n(4), 4);
    }

    #[test]
    fn samples_last_n_returns_oldest_first() {
        let mut h = SignalHistory::new(10, 100_000);
        for v in [1.0, 2.0, 3.0] {
            h.push(Timestamp(v as u64), SignalValue::Double(v), SignalType::Double);
        }
        let samples = h.samples_last_n(2);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].1, SignalValue::Double(2.0));
        assert_eq!(samples[1].1, SignalValue::Double(3.0));
    }

    #[test]
    fn has_seen_since_predicate() {
        let mut h = SignalHistory::new(10, 100_000);
        h.push(Timestamp(10), SignalValue::Double(1.0), SignalType::Double);
        assert!(h.has_seen_since(Timestamp(5)));
        assert!(!h.has_seen_since(Timestamp(20)));
    }
}
