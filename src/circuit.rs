use crate::backpressure::{Admission, CircuitState};
use crate::config::{CircuitConfig, ForwardFailure};
use crate::error::{PipelineError, Result};
use crate::metrics::CircuitMetrics;
use crate::queue::BoundedSignalQueue;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};

/// Where `Circuit::route` sent an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Filled into the downstream conductor
    Forwarded(Admission),
    /// Filled into this circuit's hold queue
    Held(Admission),
}

impl Routing {
    pub fn admission(self) -> Admission {
        match self {
            Routing::Forwarded(a) | Routing::Held(a) => a,
        }
    }

    /// The item was refused by whichever queue it was routed to
    pub fn is_dropped(self) -> bool {
        !self.admission().is_admitted()
    }
}

/// One pipeline stage: a conductor queue for ingress, a hold queue for
/// overflow, and an optional link to the next stage's conductor.
///
/// The downstream link is weak; each circuit owns only its own queues.
pub struct Circuit {
    name: String,
    conductor: Arc<BoundedSignalQueue>,
    hold: BoundedSignalQueue,
    downstream: OnceLock<Weak<BoundedSignalQueue>>,
    on_forward_failure: ForwardFailure,
    metrics: CircuitMetrics,
}

impl Circuit {
    /// Build a circuit with default capacities and thresholds
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::from_config(&CircuitConfig::new(name))
    }

    pub fn from_config(config: &CircuitConfig) -> Result<Self> {
        config.validate()?;
        let conductor = BoundedSignalQueue::with_thresholds(
            format!("{}.conductor", config.name),
            config.conductor.capacity,
            config.conductor.thresholds()?,
        )?;
        let hold = BoundedSignalQueue::with_thresholds(
            format!("{}.hold", config.name),
            config.hold.capacity,
            config.hold.thresholds()?,
        )?;
        Ok(Self {
            name: config.name.clone(),
            conductor: Arc::new(conductor),
            hold,
            downstream: OnceLock::new(),
            on_forward_failure: config.on_forward_failure,
            metrics: CircuitMetrics::new(),
        })
    }

    /// Get the circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the primary ingress queue
    pub fn conductor(&self) -> &BoundedSignalQueue {
        &self.conductor
    }

    /// Get the overflow queue
    pub fn hold(&self) -> &BoundedSignalQueue {
        &self.hold
    }

    /// Get a reference to the metrics
    pub fn metrics(&self) -> &CircuitMetrics {
        &self.metrics
    }

    /// Wire `next`'s conductor as this circuit's downstream. Allowed once.
    pub fn connect(&self, next: &Circuit) -> Result<()> {
        if Arc::ptr_eq(&self.conductor, &next.conductor) {
            return Err(PipelineError::InvalidConfig(format!(
                "circuit '{}' cannot forward to itself",
                self.name
            )));
        }
        self.downstream
            .set(Arc::downgrade(&next.conductor))
            .map_err(|_| PipelineError::AlreadyWired(self.name.clone()))?;
        debug!(circuit = %self.name, downstream = %next.name, "circuit wired");
        Ok(())
    }

    /// The downstream conductor, if wired and still alive
    pub fn downstream(&self) -> Option<Arc<BoundedSignalQueue>> {
        self.downstream.get().and_then(Weak::upgrade)
    }

    pub fn is_terminal(&self) -> bool {
        self.downstream().is_none()
    }

    /// Admission state derived from the conductor's current depth
    pub fn state(&self) -> CircuitState {
        self.conductor
            .thresholds()
            .state(self.conductor.fill_ratio())
    }

    /// Send an item taken off the conductor to its next queue.
    ///
    /// Forwards when downstream exists and its last fill was not rejected,
    /// otherwise holds locally and mirrors the hold outcome onto the
    /// conductor. A forward that is rejected anyway is dropped, or held
    /// under `ForwardFailure::Hold`.
    pub fn route(&self, item: String) -> Routing {
        let next = match self.downstream() {
            Some(next) if next.last_operation() != Admission::Rejected => next,
            _ => return self.hold_item(item),
        };

        let admission = match self.on_forward_failure {
            ForwardFailure::Drop => next.fill(item),
            ForwardFailure::Hold => {
                let admission = next.fill(item.as_str());
                if !admission.is_admitted() {
                    debug!(circuit = %self.name, "forward rejected, holding");
                    return self.hold_item(item);
                }
                admission
            }
        };

        if admission.is_admitted() {
            self.metrics.record_forwarded();
        } else {
            self.metrics.record_dropped();
            warn!(circuit = %self.name, downstream = %next.name(), "forward rejected, item dropped");
        }
        Routing::Forwarded(admission)
    }

    fn hold_item(&self, item: String) -> Routing {
        let admission = self.hold.fill(item);
        self.conductor.mirror_operation(admission);
        if admission.is_admitted() {
            self.metrics.record_held();
        } else {
            self.metrics.record_dropped();
            warn!(circuit = %self.name, "hold queue saturated, item dropped");
        }
        Routing::Held(admission)
    }

    /// Move the oldest held item downstream if the downstream conductor
    /// admits it. `None` when there is no downstream or nothing is held.
    pub fn release_held(&self) -> Option<Admission> {
        let next = self.downstream()?;
        let admission = self.hold.forward_head(&next)?;
        if admission.is_admitted() {
            self.metrics.record_released();
        }
        Some(admission)
    }

    /// Close both queues, cancelling anyone blocked on them
    pub fn close(&self) {
        self.conductor.close();
        self.hold.close();
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.name)
            .field("conductor", &self.conductor)
            .field("hold", &self.hold)
            .field("terminal", &self.is_terminal())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;

    fn saturate(queue: &BoundedSignalQueue) {
        while queue.fill("filler").is_admitted() {}
    }

    #[test]
    fn test_overflow_to_hold_when_downstream_rejects() {
        let a = Circuit::new("a").unwrap();
        let b = Circuit::new("b").unwrap();
        a.connect(&b).unwrap();

        saturate(b.conductor());
        assert_eq!(b.conductor().last_operation(), Admission::Rejected);

        assert!(a.conductor().fill("x").is_admitted());
        let item = a.conductor().try_deplete().unwrap();
        let routing = a.route(item);

        assert_eq!(routing, Routing::Held(Admission::Accepted));
        assert_eq!(a.hold().depth(), 1);
        assert_eq!(a.hold().try_deplete().as_deref(), Some("x"));
        assert_eq!(a.conductor().last_operation(), a.hold().last_operation());
        assert_eq!(a.metrics().total_held(), 1);
    }

    #[test]
    fn test_forward_when_downstream_accepts() {
        let a = Circuit::new("a").unwrap();
        let b = Circuit::new("b").unwrap();
        a.connect(&b).unwrap();

        assert_eq!(a.route("y".into()), Routing::Forwarded(Admission::Accepted));
        assert_eq!(b.conductor().try_deplete().as_deref(), Some("y"));
        assert_eq!(a.hold().depth(), 0);
        assert_eq!(a.metrics().total_forwarded(), 1);
    }

    #[test]
    fn test_terminal_circuit_always_holds() {
        let c = Circuit::new("terminal").unwrap();
        assert!(c.is_terminal());
        for i in 0..5 {
            assert!(matches!(c.route(format!("{i}")), Routing::Held(_)));
        }
        assert_eq!(c.hold().depth(), 5);
        assert_eq!(c.conductor().depth(), 0);
    }

    #[test]
    fn test_saturated_hold_drops_and_mirrors_rejection() {
        let config =
            CircuitConfig::new("small").with_hold(QueueConfig::new(2, 0.5, 1.0));
        let c = Circuit::from_config(&config).unwrap();

        assert!(!c.route("1".into()).is_dropped());
        assert!(!c.route("2".into()).is_dropped());
        let routing = c.route("3".into());
        assert_eq!(routing, Routing::Held(Admission::Rejected));
        assert!(routing.is_dropped());
        assert_eq!(c.conductor().last_operation(), Admission::Rejected);
        assert_eq!(c.hold().depth(), 2);
        assert_eq!(c.metrics().total_dropped(), 1);
    }

    #[test]
    fn test_failed_forward_policies() {
        let tight = QueueConfig::new(1, 0.5, 1.0);

        let a = Circuit::new("a").unwrap();
        let b = Circuit::from_config(&CircuitConfig::new("b").with_conductor(tight)).unwrap();
        a.connect(&b).unwrap();
        // b's last operation is still Accepted, but it is already full.
        assert!(b.conductor().fill("occupant").is_admitted());
        b.conductor().mirror_operation(Admission::Accepted);
        assert_eq!(a.route("lost".into()), Routing::Forwarded(Admission::Rejected));
        assert_eq!(a.hold().depth(), 0);

        let c = Circuit::from_config(
            &CircuitConfig::new("c").with_forward_failure(ForwardFailure::Hold),
        )
        .unwrap();
        let d = Circuit::from_config(&CircuitConfig::new("d").with_conductor(tight)).unwrap();
        c.connect(&d).unwrap();
        assert!(d.conductor().fill("occupant").is_admitted());
        d.conductor().mirror_operation(Admission::Accepted);
        assert_eq!(c.route("kept".into()), Routing::Held(Admission::Accepted));
        assert_eq!(c.hold().try_deplete().as_deref(), Some("kept"));
    }

    #[test]
    fn test_connect_rules() {
        let a = Circuit::new("a").unwrap();
        let b = Circuit::new("b").unwrap();
        assert!(matches!(a.connect(&a), Err(PipelineError::InvalidConfig(_))));
        a.connect(&b).unwrap();
        assert!(matches!(a.connect(&b), Err(PipelineError::AlreadyWired(_))));
    }

    #[test]
    fn test_dropped_downstream_counts_as_terminal() {
        let a = Circuit::new("a").unwrap();
        {
            let b = Circuit::new("b").unwrap();
            a.connect(&b).unwrap();
            assert!(!a.is_terminal());
        }
        assert!(a.is_terminal());
        assert!(matches!(a.route("z".into()), Routing::Held(_)));
    }

    #[test]
    fn test_release_held_after_recovery() {
        let a = Circuit::new("a").unwrap();
        let b = Circuit::new("b").unwrap();
        a.connect(&b).unwrap();

        saturate(b.conductor());
        a.route("waiting".into());
        assert_eq!(a.release_held(), Some(Admission::Rejected));
        assert_eq!(a.hold().depth(), 1);

        while b.conductor().try_deplete().is_some() {}
        assert!(a.release_held().unwrap().is_admitted());
        assert_eq!(a.hold().depth(), 0);
        assert_eq!(b.conductor().try_deplete().as_deref(), Some("waiting"));
        assert_eq!(a.release_held(), None);
        assert_eq!(a.metrics().total_released(), 1);
    }

    #[test]
    fn test_state_tracks_depth() {
        let c = Circuit::from_config(
            &CircuitConfig::new("s").with_conductor(QueueConfig::new(4, 0.5, 0.75)),
        )
        .unwrap();
        assert_eq!(c.state(), CircuitState::Open);
        c.conductor().fill("1");
        c.conductor().fill("2");
        assert_eq!(c.state(), CircuitState::Congested);
        c.conductor().fill("3");
        assert_eq!(c.state(), CircuitState::Closed);
        c.conductor().try_deplete();
        assert_eq!(c.state(), CircuitState::Congested);
    }
}
