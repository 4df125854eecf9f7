use crate::backpressure::{Admission, CircuitState};
use crate::circuit::Circuit;
use crate::metrics::MetricsSnapshot;
use crate::queue::Component;
use serde::Serialize;
use std::sync::Arc;

/// Read-only view of one queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub depth: usize,
    pub capacity: usize,
    pub last_operation: Admission,
    pub status_code: u16,
}

impl QueueStats {
    pub fn capture(queue: &dyn Component) -> Self {
        let last_operation = queue.last_operation();
        Self {
            name: queue.name().to_string(),
            depth: queue.depth(),
            capacity: queue.capacity(),
            last_operation,
            status_code: last_operation.status_code(),
        }
    }
}

/// Read-only view of one circuit
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub conductor: QueueStats,
    pub hold: QueueStats,
    pub metrics: MetricsSnapshot,
}

impl CircuitStats {
    pub fn capture(circuit: &Circuit) -> Self {
        Self {
            name: circuit.name().to_string(),
            state: circuit.state(),
            conductor: QueueStats::capture(circuit.conductor()),
            hold: QueueStats::capture(circuit.hold()),
            metrics: circuit.metrics().snapshot(),
        }
    }

    /// Items sitting in either queue
    pub fn depth(&self) -> usize {
        self.conductor.depth + self.hold.depth
    }
}

/// Read-only view of a whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub beats: u64,
    pub total_depth: usize,
    pub circuits: Vec<CircuitStats>,
}

impl PipelineStats {
    pub fn capture(circuits: &[Arc<Circuit>], beats: u64) -> Self {
        let circuits: Vec<CircuitStats> = circuits
            .iter()
            .map(|c| CircuitStats::capture(c))
            .collect();
        Self {
            beats,
            total_depth: circuits.iter().map(CircuitStats::depth).sum(),
            circuits,
        }
    }

    pub fn circuit(&self, name: &str) -> Option<&CircuitStats> {
        self.circuits.iter().find(|c| c.name == name)
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Pipeline Stats (beats: {}, depth: {}):\n",
            self.beats, self.total_depth
        );
        for circuit in &self.circuits {
            summary.push_str(&format!(
                "  {}: {:?}, conductor {}/{} ({}), hold {}/{} ({})\n",
                circuit.name,
                circuit.state,
                circuit.conductor.depth,
                circuit.conductor.capacity,
                circuit.conductor.last_operation,
                circuit.hold.depth,
                circuit.hold.capacity,
                circuit.hold.last_operation,
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_circuit() {
        let circuit = Arc::new(Circuit::new("words").unwrap());
        circuit.conductor().fill("a");
        circuit.route("b".into());

        let stats = PipelineStats::capture(&[Arc::clone(&circuit)], 3);
        assert_eq!(stats.beats, 3);
        assert_eq!(stats.total_depth, 2);

        let words = stats.circuit("words").unwrap();
        assert_eq!(words.state, CircuitState::Open);
        assert_eq!(words.conductor.name, "words.conductor");
        assert_eq!(words.conductor.status_code, 202);
        assert_eq!(words.hold.depth, 1);
        assert!(stats.circuit("missing").is_none());
        assert!(stats.summary().contains("words: Open"));
    }

    #[test]
    fn test_serializes_to_json() {
        let circuit = Circuit::new("json").unwrap();
        let stats = CircuitStats::capture(&circuit);
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["conductor"]["last_operation"], "Accepted");
        assert_eq!(value["state"], "Open");
        assert_eq!(value["hold"]["capacity"], 100);
    }
}
