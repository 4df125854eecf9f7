use crate::backpressure::{Admission, Thresholds};
use crate::error::{PipelineError, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

/// Capability interface shared by everything that behaves like a pipeline queue
pub trait Component: Send + Sync {
    /// Diagnostic label
    fn name(&self) -> &str;

    /// Attempt to enqueue an item, reporting the admission outcome
    fn fill(&self, item: String) -> Admission;

    /// Remove the head item, blocking until one is available
    fn deplete(&self) -> Result<String>;

    /// Handle that wakes when new work has been enqueued
    fn await_attention(&self) -> Attention;

    /// Number of items currently queued
    fn depth(&self) -> usize;

    /// Fixed maximum number of items
    fn capacity(&self) -> usize;

    /// Outcome of the most recent fill
    fn last_operation(&self) -> Admission;
}

struct Inner {
    items: VecDeque<String>,
    last_operation: Admission,
    // Dropped on close so attention waiters observe disconnection.
    attention: Option<Sender<()>>,
    closed: bool,
}

/// A fixed-capacity FIFO of strings with threshold-driven admission control
/// and a single-slot attention signal.
///
/// All state lives behind one mutex, so the admission status is always
/// computed atomically with the enqueue it describes.
pub struct BoundedSignalQueue {
    name: String,
    capacity: usize,
    thresholds: Thresholds,
    inner: Mutex<Inner>,
    available: Condvar,
    attention_rx: Receiver<()>,
}

impl BoundedSignalQueue {
    /// Create an empty queue
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        slow_threshold: f64,
        stop_threshold: f64,
    ) -> Result<Self> {
        let thresholds = Thresholds::new(slow_threshold, stop_threshold)?;
        Self::with_thresholds(name, capacity, thresholds)
    }

    /// Create an empty queue from already validated thresholds
    pub fn with_thresholds(
        name: impl Into<String>,
        capacity: usize,
        thresholds: Thresholds,
    ) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "queue '{name}' capacity must be positive"
            )));
        }
        let (tx, rx) = channel::bounded(1);
        Ok(Self {
            name,
            capacity,
            thresholds,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                last_operation: Admission::Accepted,
                attention: Some(tx),
                closed: false,
            }),
            available: Condvar::new(),
            attention_rx: rx,
        })
    }

    /// Get the queue's diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the admission thresholds
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn ratio(&self, len: usize) -> f64 {
        len as f64 / self.capacity as f64
    }

    /// Attempt to enqueue `item`.
    ///
    /// Rejection is decided on the fill ratio before insertion, congestion
    /// on the ratio after it. A rejected call leaves the queue untouched
    /// apart from its last operation status.
    pub fn fill(&self, item: impl Into<String>) -> Admission {
        let mut inner = self.inner.lock();

        let pre_ratio = self.ratio(inner.items.len());
        if inner.closed || self.thresholds.rejects(pre_ratio) {
            inner.last_operation = Admission::Rejected;
            debug!(queue = %self.name, ratio = pre_ratio, "fill rejected");
            return Admission::Rejected;
        }

        inner.items.push_back(item.into());
        self.available.notify_one();
        if let Some(tx) = &inner.attention {
            // A full slot means someone already made the call.
            let _ = tx.try_send(());
        }

        let post_ratio = self.ratio(inner.items.len());
        let admission = self.thresholds.classify(post_ratio);
        inner.last_operation = admission;
        trace!(queue = %self.name, ratio = post_ratio, %admission, "fill");
        admission
    }

    /// Remove and return the head item, blocking while the queue is empty.
    ///
    /// Returns `Cancelled` once the queue has been closed and drained.
    pub fn deplete(&self) -> Result<String> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.closed {
                return Err(PipelineError::Cancelled);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Remove and return the head item if there is one
    pub fn try_deplete(&self) -> Option<String> {
        self.inner.lock().items.pop_front()
    }

    /// Move the head item into `target` if `target` admits it.
    ///
    /// The item stays at the head on rejection. Returns `None` when empty.
    /// Holds this queue's lock across the target fill, so callers must
    /// only forward along an acyclic chain.
    pub(crate) fn forward_head(&self, target: &BoundedSignalQueue) -> Option<Admission> {
        let mut inner = self.inner.lock();
        let item = inner.items.front()?.clone();
        let admission = target.fill(item);
        if admission.is_admitted() {
            inner.items.pop_front();
        }
        Some(admission)
    }

    /// Wait handle for the attention signal
    pub fn await_attention(&self) -> Attention {
        Attention {
            rx: self.attention_rx.clone(),
        }
    }

    /// Get the number of queued items
    pub fn depth(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Current depth as a fraction of capacity
    pub fn fill_ratio(&self) -> f64 {
        self.ratio(self.depth())
    }

    /// Get the outcome of the most recent fill
    pub fn last_operation(&self) -> Admission {
        self.inner.lock().last_operation
    }

    /// Overwrite the last operation status with the outcome of a fill made
    /// on this queue's behalf elsewhere.
    pub(crate) fn mirror_operation(&self, admission: Admission) {
        self.inner.lock().last_operation = admission;
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Close the queue: later fills are rejected, blocked `deplete` calls
    /// return `Cancelled` once empty and attention waiters disconnect.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.attention = None;
        self.available.notify_all();
        debug!(queue = %self.name, remaining = inner.items.len(), "queue closed");
    }
}

impl Component for BoundedSignalQueue {
    fn name(&self) -> &str {
        BoundedSignalQueue::name(self)
    }

    fn fill(&self, item: String) -> Admission {
        BoundedSignalQueue::fill(self, item)
    }

    fn deplete(&self) -> Result<String> {
        BoundedSignalQueue::deplete(self)
    }

    fn await_attention(&self) -> Attention {
        BoundedSignalQueue::await_attention(self)
    }

    fn depth(&self) -> usize {
        BoundedSignalQueue::depth(self)
    }

    fn capacity(&self) -> usize {
        BoundedSignalQueue::capacity(self)
    }

    fn last_operation(&self) -> Admission {
        BoundedSignalQueue::last_operation(self)
    }
}

impl std::fmt::Debug for BoundedSignalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedSignalQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("depth", &self.depth())
            .field("last_operation", &self.last_operation())
            .finish()
    }
}

/// Wait handle for a queue's single-slot attention signal.
///
/// A wake means "there may be work": several fills can collapse into one
/// signal, so consumers drain until the queue reports empty.
#[derive(Debug, Clone)]
pub struct Attention {
    rx: Receiver<()>,
}

impl Attention {
    /// Block until the signal is raised, consuming it
    pub fn wait(&self) -> Result<()> {
        self.rx.recv().map_err(|_| PipelineError::Cancelled)
    }

    /// Block for at most `timeout`; `Ok(false)` means nothing arrived
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Cancelled),
        }
    }

    /// Whether a signal is raised and not yet consumed
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Underlying receiver, for use in `crossbeam::select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
