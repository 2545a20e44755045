// src/core/queue.rs

//! The bounded, in-memory fan-in queue: a fixed-capacity FIFO of
//! `(kind, payload, timestamp)` tuples with drop-oldest overflow and
//! per-kind cumulative/last-minute statistics.
//!
//! The queue itself is a plain `VecDeque` behind a `parking_lot::Mutex`
//! (short, synchronous critical sections guarded by `parking_lot` rather
//! than `tokio::sync::Mutex`, since nothing here holds the lock across an
//! `.await`), paired with a `tokio::sync::Notify` so the processor task can
//! sleep until a tuple is available. This gives exact drop-oldest
//! semantics, which a bounded `mpsc` channel cannot: an `mpsc` can only
//! reject the *newest* item on a full channel, not evict the oldest one
//! already queued.

use crate::config::DecoderKind;
use crate::core::message::RawPayload;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::time::{self, Duration};
use tracing::warn;

/// Cumulative-and-last-minute counters for a single decoder kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct KindCounters {
    pub total: u64,
    pub total_last_minute: u64,
    pub errors: u64,
    pub errors_last_minute: u64,
}

/// An independent snapshot of the queue's statistics, safe to hand to
/// readers without holding any lock on the live state.
#[derive(Debug, Default, Clone)]
pub struct QueueStatistics {
    pub per_kind: HashMap<DecoderKind, KindCounters>,
    pub overflow_count: u64,
    pub length: usize,
}

struct QueueItem {
    payload: RawPayload,
    #[allow(dead_code)]
    timestamp: f64,
}

struct Inner {
    items: Mutex<VecDeque<QueueItem>>,
    counters: Mutex<HashMap<DecoderKind, KindCounters>>,
    overflow_count: AtomicU64,
    capacity: usize,
    notify: Notify,
}

/// The bounded queue. Cloning a `MessageQueue` is cheap and yields a handle
/// to the same underlying state.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

impl MessageQueue {
    /// Creates a new bounded queue with the given capacity (default 15).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                counters: Mutex::new(HashMap::new()),
                overflow_count: AtomicU64::new(0),
                capacity,
                notify: Notify::new(),
            }),
        }
    }

    /// Pushes a payload onto the queue. If the queue is full, the oldest
    /// tuple is discarded and an overflow is recorded.
    pub fn push(&self, kind: DecoderKind, payload: Value, channel: usize) {
        self.update_counters(kind, &payload);

        let item = QueueItem {
            payload: RawPayload {
                kind,
                channel,
                value: payload,
            },
            timestamp: now_secs(),
        };

        {
            let mut items = self.inner.items.lock();
            if items.len() >= self.inner.capacity {
                items.pop_front();
                self.inner.overflow_count.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "message queue full at capacity {}; dropped oldest tuple",
                    self.inner.capacity
                );
            }
            items.push_back(item);
        }
        self.inner.notify.notify_one();
    }

    fn update_counters(&self, kind: DecoderKind, payload: &Value) {
        let error_delta = payload
            .get("error")
            .and_then(Value::as_i64)
            .filter(|e| *e > 0)
            .unwrap_or(0) as u64;

        let mut counters = self.inner.counters.lock();
        let entry = counters.entry(kind).or_default();
        entry.total += 1;
        entry.total_last_minute += 1;
        entry.errors += error_delta;
        entry.errors_last_minute += error_delta;
    }

    pub fn length(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Returns an independent copy of the current statistics.
    pub fn snapshot_statistics(&self) -> QueueStatistics {
        QueueStatistics {
            per_kind: self.inner.counters.lock().clone(),
            overflow_count: self.inner.overflow_count.load(Ordering::Relaxed),
            length: self.length(),
        }
    }

    /// Zeroes every last-minute counter; cumulative counters are untouched.
    pub fn reset_last_minute(&self) {
        let mut counters = self.inner.counters.lock();
        for c in counters.values_mut() {
            c.total_last_minute = 0;
            c.errors_last_minute = 0;
        }
    }

    /// Clears every counter, including cumulative totals. Test/recycling hook.
    pub fn clear_statistics(&self) {
        let mut counters = self.inner.counters.lock();
        counters.clear();
        self.inner.overflow_count.store(0, Ordering::Relaxed);
    }

    /// Drops every queued item and resets all statistics. Test/recycling hook.
    pub fn destroy(&self) {
        self.inner.items.lock().clear();
        self.clear_statistics();
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Pops the oldest queued tuple, waiting if the queue is currently empty.
    pub async fn recv(&self) -> RawPayload {
        loop {
            if let Some(item) = self.inner.items.lock().pop_front() {
                return item.payload;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Runs the periodic last-minute-counter reset, aligned to the next
    /// wall-clock minute boundary via `ceil(now / 60)` so the alignment
    /// tolerates clock jumps.
    pub async fn run_minute_reset(&self, mut shutdown_rx: tokio::sync::broadcast::Receiver<()>) {
        loop {
            let sleep_for = duration_until_next_minute();
            tokio::select! {
                _ = time::sleep(sleep_for) => {
                    self.reset_last_minute();
                }
                _ = shutdown_rx.recv() => {
                    return;
                }
            }
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Computes the duration until the next minute boundary using
/// `ceil(now / 60)`, tolerant of wall-clock jumps.
pub fn duration_until_next_minute() -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let next_boundary = secs.div_ceil(60) * 60;
    let next_boundary = if next_boundary == secs {
        next_boundary + 60
    } else {
        next_boundary
    };
    Duration::from_secs(next_boundary - secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn push_increments_cumulative_and_last_minute() {
        let queue = MessageQueue::new(4);
        queue.push(DecoderKind::Acars, json!({}), 0);
        queue.push(DecoderKind::Acars, json!({"error": 2}), 0);

        let stats = queue.snapshot_statistics();
        let counters = stats.per_kind[&DecoderKind::Acars];
        assert_eq!(counters.total, 2);
        assert_eq!(counters.total_last_minute, 2);
        assert_eq!(counters.errors, 2);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_caps_length_at_capacity() {
        let queue = MessageQueue::new(3);
        for i in 0..4 {
            queue.push(DecoderKind::Acars, json!({"n": i}), 0);
        }
        let stats = queue.snapshot_statistics();
        assert_eq!(stats.length, 3);
        assert_eq!(stats.overflow_count, 1);

        // The oldest tuple (n=0) was dropped; n=1 is now the front.
        let first = queue.recv().await;
        assert_eq!(first.value["n"], 1);
    }

    #[tokio::test]
    async fn minute_reset_zeroes_last_minute_but_not_cumulative() {
        let queue = MessageQueue::new(4);
        queue.push(DecoderKind::Hfdl, json!({}), 0);
        queue.reset_last_minute();

        let stats = queue.snapshot_statistics();
        let counters = stats.per_kind[&DecoderKind::Hfdl];
        assert_eq!(counters.total, 1);
        assert_eq!(counters.total_last_minute, 0);
    }

    #[test]
    fn destroy_clears_everything() {
        let queue = MessageQueue::new(4);
        queue.push(DecoderKind::Acars, json!({}), 0);
        queue.destroy();
        assert_eq!(queue.length(), 0);
        assert_eq!(queue.snapshot_statistics().overflow_count, 0);
    }
}
