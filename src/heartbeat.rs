use crate::circuit::Circuit;
use crate::stats::PipelineStats;
use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Periodically logs aggregate queue depth and status. Never mutates a queue.
pub struct Heartbeat {
    interval: Duration,
    circuits: Vec<Arc<Circuit>>,
    beats: Arc<AtomicU64>,
    shutdown: Receiver<()>,
}

impl Heartbeat {
    pub fn new(interval: Duration, circuits: Vec<Arc<Circuit>>, shutdown: Receiver<()>) -> Self {
        Self {
            interval,
            circuits,
            beats: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }

    /// Shared beat counter, readable while `run` is in progress
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.beats)
    }

    /// Beat every interval until shutdown
    pub fn run(&self) {
        let ticker = channel::tick(self.interval);
        loop {
            select! {
                recv(ticker) -> _ => {
                    self.beat();
                }
                recv(self.shutdown) -> _ => break,
            }
        }
        debug!(beats = self.beats.load(Ordering::Relaxed), "heartbeat stopped");
    }

    /// Record one beat and log the pipeline state
    pub fn beat(&self) -> PipelineStats {
        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        let stats = PipelineStats::capture(&self.circuits, beats);
        info!(beats, total_depth = stats.total_depth, "heartbeat");
        for circuit in &stats.circuits {
            debug!(
                circuit = %circuit.name,
                state = ?circuit.state,
                conductor_depth = circuit.conductor.depth,
                conductor_status = %circuit.conductor.last_operation,
                hold_depth = circuit.hold.depth,
                "circuit status"
            );
        }
        stats
    }
}
