use thiserror::Error;

/// Result type for circuit pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Capacity or threshold values are malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A circuit's downstream link was already set
    #[error("Circuit '{0}' is already wired to a downstream circuit")]
    AlreadyWired(String),

    /// The queue was closed while waiting
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// No circuits in pipeline
    #[error("Cannot start pipeline with no circuits")]
    NoCircuits,

    /// Stage execution error
    #[error("Stage execution failed: {0}")]
    StageError(String),

    /// A runner or heartbeat thread could not be spawned or joined
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Whether this error is the shutdown outcome rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
