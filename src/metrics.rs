use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-circuit routing counters
#[derive(Debug, Clone)]
pub struct CircuitMetrics {
    /// Items taken off the conductor and transformed
    processed: Arc<AtomicU64>,
    /// Items handed to the downstream conductor
    forwarded: Arc<AtomicU64>,
    /// Items placed in the hold queue
    held: Arc<AtomicU64>,
    /// Held items later moved downstream
    released: Arc<AtomicU64>,
    /// Items lost to a rejected forward or hold fill
    dropped: Arc<AtomicU64>,
    /// Items whose stage transformation failed
    failed: Arc<AtomicU64>,
    start_time: Instant,
}

impl CircuitMetrics {
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            forwarded: Arc::new(AtomicU64::new(0)),
            held: Arc::new(AtomicU64::new(0)),
            released: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_held(&self) {
        self.held.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn total_held(&self) -> u64 {
        self.held.load(Ordering::Relaxed)
    }

    pub fn total_released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Processed items per second since creation
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_processed() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.total_processed(),
            forwarded: self.total_forwarded(),
            held: self.total_held(),
            released: self.total_released(),
            dropped: self.total_dropped(),
            failed: self.total_failed(),
            throughput_ips: self.throughput_ips(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for CircuitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a circuit's counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub forwarded: u64,
    pub held: u64,
    pub released: u64,
    pub dropped: u64,
    pub failed: u64,
    pub throughput_ips: f64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    pub fn format(&self) -> String {
        format!(
            "Processed: {}, Forwarded: {}, Held: {}, Released: {}, Dropped: {}, \
             Failed: {}, Throughput: {:.2} items/s, Elapsed: {:.2}s",
            self.processed,
            self.forwarded,
            self.held,
            self.released,
            self.dropped,
            self.failed,
            self.throughput_ips,
            self.elapsed.as_secs_f64()
        )
    }
}
