use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single `fill` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Admission {
    /// Item enqueued, queue below its slow threshold
    Accepted,
    /// Item enqueued, queue at or above its slow threshold
    Congested,
    /// Item refused, queue at or above its stop threshold
    Rejected,
}

impl Admission {
    /// Whether the item was enqueued
    pub fn is_admitted(self) -> bool {
        !matches!(self, Admission::Rejected)
    }

    /// HTTP status code conventionally used for this outcome
    pub fn status_code(self) -> u16 {
        match self {
            Admission::Accepted => 202,
            Admission::Congested => 429,
            Admission::Rejected => 503,
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Admission::Accepted => "accepted",
            Admission::Congested => "congested",
            Admission::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Effective admission state of a circuit, derived from its conductor depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Below the slow threshold
    Open,
    /// Between the slow and stop thresholds, still accepting
    Congested,
    /// At or above the stop threshold, rejecting
    Closed,
}

/// Fill-ratio boundaries for admission control
///
/// Both values are fractions of capacity in `(0, 1]` with `slow < stop`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    slow: f64,
    stop: f64,
}

impl Thresholds {
    /// Thresholds tuned for upstream admission on a conductor queue
    pub const CONDUCTOR: Thresholds = Thresholds {
        slow: 0.75,
        stop: 0.95,
    };

    /// Thresholds tuned for buffering depth on a hold queue
    pub const HOLD: Thresholds = Thresholds {
        slow: 0.50,
        stop: 0.95,
    };

    /// Create validated thresholds
    pub fn new(slow: f64, stop: f64) -> Result<Self> {
        if !(slow > 0.0 && slow <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "slow threshold {slow} must be in (0, 1]"
            )));
        }
        if !(stop > 0.0 && stop <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "stop threshold {stop} must be in (0, 1]"
            )));
        }
        if slow >= stop {
            return Err(PipelineError::InvalidConfig(format!(
                "slow threshold {slow} must be below stop threshold {stop}"
            )));
        }
        Ok(Self { slow, stop })
    }

    pub fn slow(&self) -> f64 {
        self.slow
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Whether a queue at `ratio` refuses new work
    pub fn rejects(&self, ratio: f64) -> bool {
        ratio >= self.stop
    }

    /// Outcome for an admitted item, given the ratio after insertion
    pub fn classify(&self, post_ratio: f64) -> Admission {
        if post_ratio >= self.slow {
            Admission::Congested
        } else {
            Admission::Accepted
        }
    }

    /// Circuit state for a queue currently at `ratio`
    pub fn state(&self, ratio: f64) -> CircuitState {
        if ratio >= self.stop {
            CircuitState::Closed
        } else if ratio >= self.slow {
            CircuitState::Congested
        } else {
            CircuitState::Open
        }
    }
}
