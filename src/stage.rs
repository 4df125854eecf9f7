use crate::circuit::Circuit;
use crate::error::Result;
use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for the transformation a circuit applies to items leaving its conductor
pub trait Stage: Send + 'static {
    /// Transform an item. `None` drops it without routing.
    fn process(&mut self, item: String) -> Result<Option<String>>;

    /// Called before the runner starts waiting for work
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the runner is shutting down
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "stage"
    }
}

/// Drives one circuit: waits for attention on its queues, pushes conductor
/// items through a stage and routes the results, and releases held items
/// downstream when there is room.
pub struct CircuitRunner {
    circuit: Arc<Circuit>,
    shutdown: Receiver<()>,
    retry_interval: Duration,
}

impl CircuitRunner {
    /// `shutdown` ends the loop when it yields or disconnects
    pub fn new(circuit: Arc<Circuit>, shutdown: Receiver<()>, retry_interval: Duration) -> Self {
        Self {
            circuit,
            shutdown,
            retry_interval,
        }
    }

    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Run until shutdown or until the circuit's queues are closed
    pub fn run(&self, mut stage: Box<dyn Stage>) -> Result<()> {
        stage.on_start()?;

        let conductor = self.circuit.conductor().await_attention();
        let hold_attention = self.circuit.hold().await_attention();
        let unwired = channel::never();
        // Also wakes the loop to notice a downstream wired after start.
        let retry = channel::tick(self.retry_interval);

        debug!(circuit = %self.circuit.name(), stage = stage.name(), "runner started");
        loop {
            // A terminal circuit's hold queue is pipeline output; leave its
            // attention signal to whoever consumes it.
            let hold = if self.circuit.is_terminal() {
                &unwired
            } else {
                hold_attention.receiver()
            };
            select! {
                recv(conductor.receiver()) -> signal => {
                    if signal.is_err() {
                        break;
                    }
                    self.drain_conductor(stage.as_mut());
                }
                recv(hold) -> signal => {
                    if signal.is_err() {
                        break;
                    }
                    self.release_held();
                }
                recv(retry) -> _ => self.release_held(),
                recv(self.shutdown) -> _ => break,
            }
        }
        debug!(circuit = %self.circuit.name(), "runner stopped");

        stage.on_shutdown()
    }

    fn drain_conductor(&self, stage: &mut dyn Stage) {
        let metrics = self.circuit.metrics();
        while let Some(item) = self.circuit.conductor().try_deplete() {
            match stage.process(item) {
                Ok(Some(output)) => {
                    metrics.record_processed();
                    self.circuit.route(output);
                }
                Ok(None) => metrics.record_processed(),
                Err(e) => {
                    metrics.record_failed();
                    warn!(circuit = %self.circuit.name(), stage = stage.name(), error = %e, "stage failed");
                }
            }
        }
    }

    fn release_held(&self) {
        while let Some(admission) = self.circuit.release_held() {
            if !admission.is_admitted() {
                break;
            }
        }
    }
}

/// Forwards items unchanged
#[derive(Debug)]
pub struct PassthroughStage;

impl Stage for PassthroughStage {
    fn process(&mut self, item: String) -> Result<Option<String>> {
        Ok(Some(item))
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

#[derive(Debug)]
pub struct LowercaseStage;

impl Stage for LowercaseStage {
    fn process(&mut self, item: String) -> Result<Option<String>> {
        Ok(Some(item.to_lowercase()))
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}

#[derive(Debug)]
pub struct UppercaseStage;

impl Stage for UppercaseStage {
    fn process(&mut self, item: String) -> Result<Option<String>> {
        Ok(Some(item.to_uppercase()))
    }

    fn name(&self) -> &str {
        "uppercase"
    }
}

/// Replaces each item with its hex-encoded SHA-256 digest
#[derive(Debug)]
pub struct HashStage;

impl Stage for HashStage {
    fn process(&mut self, item: String) -> Result<Option<String>> {
        Ok(Some(format!("{:x}", Sha256::digest(item.as_bytes()))))
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// A filtering stage that passes through items matching a predicate
#[derive(Debug)]
pub struct FilterStage<F>
where
    F: Fn(&str) -> bool + Send + 'static,
{
    name: String,
    predicate: F,
}

impl<F> FilterStage<F>
where
    F: Fn(&str) -> bool + Send + 'static,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> Stage for FilterStage<F>
where
    F: Fn(&str) -> bool + Send + 'static,
{
    fn process(&mut self, item: String) -> Result<Option<String>> {
        Ok((self.predicate)(&item).then_some(item))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A mapping stage that transforms each item
#[derive(Debug)]
pub struct MapStage<F>
where
    F: Fn(String) -> Result<String> + Send + 'static,
{
    name: String,
    mapper: F,
}

impl<F> MapStage<F>
where
    F: Fn(String) -> Result<String> + Send + 'static,
{
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<F> Stage for MapStage<F>
where
    F: Fn(String) -> Result<String> + Send + 'static,
{
    fn process(&mut self, item: String) -> Result<Option<String>> {
        Ok(Some((self.mapper)(item)?))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
