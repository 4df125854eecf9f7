use crate::circuit::Circuit;
use crate::config::{CircuitConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::heartbeat::Heartbeat;
use crate::queue::BoundedSignalQueue;
use crate::stage::{CircuitRunner, Stage};
use crate::stats::{CircuitStats, PipelineStats};
use crossbeam::channel::{self, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Builder for a linear chain of circuits
pub struct PipelineBuilder {
    circuits: Vec<CircuitConfig>,
    heartbeat_interval: Duration,
    retry_interval: Duration,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::from_config(PipelineConfig::default())
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            retry_interval: config.retry_interval(),
            circuits: config.circuits,
        }
    }

    /// Append a circuit with default queue settings
    pub fn add_circuit(self, name: impl Into<String>) -> Self {
        self.add_circuit_config(CircuitConfig::new(name))
    }

    /// Append a fully configured circuit
    pub fn add_circuit_config(mut self, config: CircuitConfig) -> Self {
        self.circuits.push(config);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// How often runners retry moving held items downstream
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Build every circuit and wire each one to the next
    pub fn build(self) -> Result<Pipeline> {
        if self.circuits.is_empty() {
            return Err(PipelineError::NoCircuits);
        }
        if self.heartbeat_interval.is_zero() || self.retry_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "heartbeat and retry intervals must be positive".into(),
            ));
        }
        for (i, config) in self.circuits.iter().enumerate() {
            if self.circuits[..i].iter().any(|c| c.name == config.name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "duplicate circuit name '{}'",
                    config.name
                )));
            }
        }

        let circuits = self
            .circuits
            .iter()
            .map(|config| Circuit::from_config(config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        for pair in circuits.windows(2) {
            pair[0].connect(&pair[1])?;
        }

        Ok(Pipeline {
            circuits,
            heartbeat_interval: self.heartbeat_interval,
            retry_interval: self.retry_interval,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain of wired circuits, not yet running
pub struct Pipeline {
    circuits: Vec<Arc<Circuit>>,
    heartbeat_interval: Duration,
    retry_interval: Duration,
}

impl Pipeline {
    /// Conductor of the first circuit, where producers fill
    pub fn input(&self) -> &BoundedSignalQueue {
        self.circuits[0].conductor()
    }

    /// Hold queue of the last circuit, where finished items collect
    pub fn output(&self) -> &BoundedSignalQueue {
        self.circuits[self.circuits.len() - 1].hold()
    }

    pub fn circuits(&self) -> &[Arc<Circuit>] {
        &self.circuits
    }

    /// Look up a circuit by name
    pub fn circuit(&self, name: &str) -> Option<Arc<Circuit>> {
        self.circuits.iter().find(|c| c.name() == name).cloned()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats::capture(&self.circuits, 0)
    }

    /// Start one runner thread per circuit plus the heartbeat.
    ///
    /// `stage_factory` receives each circuit's index.
    pub fn start<F>(self, mut stage_factory: F) -> Result<RunningPipeline>
    where
        F: FnMut(usize) -> Box<dyn Stage>,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let mut running = RunningPipeline {
            pipeline: self,
            shutdown: Some(shutdown_tx),
            handles: Vec::new(),
            heartbeat: None,
            beats: Arc::new(AtomicU64::new(0)),
        };

        let circuits = running.pipeline.circuits.clone();
        for (idx, circuit) in circuits.iter().enumerate() {
            let stage = stage_factory(idx);
            let runner = CircuitRunner::new(
                Arc::clone(circuit),
                shutdown_rx.clone(),
                running.pipeline.retry_interval,
            );
            let spawned = thread::Builder::new()
                .name(format!("circuit-{}", circuit.name()))
                .spawn(move || runner.run(stage));
            match spawned {
                Ok(handle) => running.handles.push(handle),
                Err(e) => {
                    let _ = running.stop();
                    return Err(PipelineError::ThreadError(format!(
                        "failed to spawn circuit-{}: {e}",
                        circuit.name()
                    )));
                }
            }
        }

        let heartbeat = Heartbeat::new(
            running.pipeline.heartbeat_interval,
            circuits,
            shutdown_rx,
        );
        running.beats = heartbeat.counter();
        let spawned = thread::Builder::new()
            .name("heartbeat".into())
            .spawn(move || heartbeat.run());
        match spawned {
            Ok(handle) => running.heartbeat = Some(handle),
            Err(e) => {
                let _ = running.stop();
                return Err(PipelineError::ThreadError(format!(
                    "failed to spawn heartbeat: {e}"
                )));
            }
        }

        info!(circuits = running.pipeline.circuits.len(), "pipeline started");
        Ok(running)
    }
}

/// A running pipeline that can be fed, monitored and shut down
pub struct RunningPipeline {
    pipeline: Pipeline,
    shutdown: Option<Sender<()>>,
    handles: Vec<JoinHandle<Result<()>>>,
    heartbeat: Option<JoinHandle<()>>,
    beats: Arc<AtomicU64>,
}

impl RunningPipeline {
    pub fn input(&self) -> &BoundedSignalQueue {
        self.pipeline.input()
    }

    pub fn output(&self) -> &BoundedSignalQueue {
        self.pipeline.output()
    }

    pub fn circuit(&self, name: &str) -> Option<Arc<Circuit>> {
        self.pipeline.circuit(name)
    }

    /// Heartbeats fired since start
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats::capture(&self.pipeline.circuits, self.beats())
    }

    /// Stats for one circuit by name
    pub fn circuit_stats(&self, name: &str) -> Option<CircuitStats> {
        self.pipeline
            .circuits
            .iter()
            .find(|c| c.name() == name)
            .map(|c| CircuitStats::capture(c))
    }

    /// Stop every runner and the heartbeat, cancel blocked consumers and
    /// wait for all threads.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        // Disconnecting the channel wakes every select on it.
        self.shutdown.take();
        for circuit in &self.pipeline.circuits {
            circuit.close();
        }

        let mut first_error = None;
        for handle in self.handles.drain(..) {
            let result = handle
                .join()
                .map_err(|_| PipelineError::ThreadError("runner panicked".into()))
                .and_then(|r| r);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        if let Some(handle) = self.heartbeat.take() {
            if handle.join().is_err() {
                first_error.get_or_insert(PipelineError::ThreadError(
                    "heartbeat panicked".into(),
                ));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(beats = self.beats(), "pipeline stopped");
                Ok(())
            }
        }
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::PassthroughStage;

    #[test]
    fn test_pipeline_builder() {
        let pipeline = PipelineBuilder::new()
            .add_circuit("first")
            .add_circuit("second")
            .build()
            .unwrap();
        let circuits = pipeline.circuits();
        assert_eq!(circuits.len(), 2);
        assert!(!circuits[0].is_terminal());
        assert!(circuits[1].is_terminal());
        assert_eq!(pipeline.input().name(), "first.conductor");
        assert_eq!(pipeline.output().name(), "second.hold");
    }

    #[test]
    fn test_no_circuits_error() {
        let result = PipelineBuilder::new().build();
        assert!(matches!(result, Err(PipelineError::NoCircuits)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = PipelineBuilder::new()
            .add_circuit("same")
            .add_circuit("same")
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_and_shutdown() {
        let pipeline = PipelineBuilder::new()
            .add_circuit("only")
            .with_heartbeat_interval(Duration::from_secs(60))
            .build()
            .unwrap();
        let running = pipeline.start(|_| Box::new(PassthroughStage)).unwrap();
        assert!(running.circuit("only").is_some());
        assert_eq!(running.beats(), 0);
        running.shutdown().unwrap();
    }
}
