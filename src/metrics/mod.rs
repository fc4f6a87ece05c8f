//! Operation counters for the concurrent queues
//!
//! Every concurrent queue records how many elements it has accepted, handed
//! out, dropped past its bound, and how often an operation had to retry a
//! contended CAS. The counters are plain `Relaxed` fetch-adds: cheap enough
//! for real-time enqueue paths and precise enough to verify the conservation
//! invariant (enqueued − dequeued − dropped = elements still queued).

use core::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of a queue's counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueMetrics {
    /// Elements accepted by `enqueue`.
    pub enqueued: u64,
    /// Elements handed out by `dequeue` / `dequeue_all`.
    pub dequeued: u64,
    /// Elements dropped by bound enforcement.
    pub dropped: u64,
    /// CAS retries across all operations.
    pub contended: u64,
}

impl QueueMetrics {
    /// Elements currently owned by the queue, as implied by the counters.
    ///
    /// Transiently inaccurate while operations are in flight on other
    /// threads; exact once the queue is quiescent.
    pub fn in_queue(&self) -> u64 {
        self.enqueued - self.dequeued - self.dropped
    }

    /// Fraction of enqueued elements that were dropped by the bound, as a
    /// percentage.
    pub fn drop_rate(&self) -> f64 {
        if self.enqueued == 0 {
            0.0
        } else {
            (self.dropped as f64 / self.enqueued as f64) * 100.0
        }
    }
}

/// Internal atomic counter block embedded in each queue.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
    contended: AtomicU64,
}

impl AtomicMetrics {
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dequeue(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dequeues(&self, n: u64) {
        self.dequeued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drops(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueMetrics {
        QueueMetrics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.enqueued.store(0, Ordering::Relaxed);
        self.dequeued.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.contended.store(0, Ordering::Relaxed);
    }
}

/// Implemented by every concurrent queue in this crate.
pub trait MetricsCollector {
    /// A snapshot of the queue's operation counters.
    fn metrics(&self) -> QueueMetrics;

    /// Resets all counters to zero.
    fn reset_metrics(&self);
}
