//! Backpressure-aware bounded queues composed into multi-stage circuits.
//!
//! The leaf primitive is [`BoundedSignalQueue`]: a fixed-capacity FIFO of
//! strings whose `fill` decides admission from its fill ratio, reporting
//! `Accepted`, `Congested` or `Rejected`, and raises a single-slot
//! attention signal that consumers wait on instead of polling.
//!
//! A [`Circuit`] pairs a conductor queue with a hold queue and an optional
//! link to the next circuit's conductor. Items leaving the conductor are
//! forwarded downstream while it accepts work and overflow into the hold
//! queue when it does not.
//!
//! # Features
//!
//! - Threshold-based admission control per queue
//! - Coalescing attention signal built on a one-slot crossbeam channel
//! - Overflow routing between chained circuits, with held items released
//!   once downstream recovers
//! - One runner thread per circuit, cancelled cleanly on shutdown
//! - Per-circuit counters, serializable stats and a periodic heartbeat
//!
//! # Example
//!
//! ```ignore
//! use circuit_pipeline::{LowercaseStage, PipelineBuilder, UppercaseStage};
//!
//! let pipeline = PipelineBuilder::new()
//!     .add_circuit("lowercase")
//!     .add_circuit("uppercase")
//!     .build()?;
//!
//! let running = pipeline.start(|idx| match idx {
//!     0 => Box::new(LowercaseStage),
//!     _ => Box::new(UppercaseStage),
//! })?;
//!
//! running.input().fill("Hello");
//! let shouted = running.output().deplete()?;
//! running.shutdown()?;
//! ```

pub mod backpressure;
pub mod circuit;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod stage;
pub mod stats;

// Re-exports for convenience
pub use backpressure::{Admission, CircuitState, Thresholds};
pub use circuit::{Circuit, Routing};
pub use config::{CircuitConfig, ForwardFailure, PipelineConfig, QueueConfig};
pub use error::{PipelineError, Result};
pub use heartbeat::Heartbeat;
pub use metrics::{CircuitMetrics, MetricsSnapshot};
pub use pipeline::{Pipeline, PipelineBuilder, RunningPipeline};
pub use queue::{Attention, BoundedSignalQueue, Component};
pub use stage::{
    CircuitRunner, FilterStage, HashStage, LowercaseStage, MapStage, PassthroughStage, Stage,
    UppercaseStage,
};
pub use stats::{CircuitStats, PipelineStats, QueueStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
