//! The contract every leaf probe implements.

use thiserror::Error;

use crate::descriptor::Sample;

/// Errors a probe can report for one update.
///
/// These are local to the failing probe: the engine records the failure
/// and keeps going with the other probes.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The data source does not exist or cannot be reached.
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The probe cannot work on this platform or kernel.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The probe's own settings are invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The data source returned something that could not be interpreted.
    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The update did not finish within its time budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// An earlier update of the same instance is still running.
    #[error("previous update still in progress")]
    Busy,

    /// The update panicked or its task was cancelled.
    #[error("probe task aborted: {0}")]
    Aborted(String),
}

impl ProbeError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Destination for the samples a probe produces during one update.
pub trait SampleSink {
    fn emit(&mut self, sample: Sample);
}

impl SampleSink for Vec<Sample> {
    fn emit(&mut self, sample: Sample) {
        self.push(sample);
    }
}

/// A single metric-gathering unit.
///
/// Instances are built once at startup and updated on every scrape. The
/// engine never calls `update` on the same instance concurrently, so a probe
/// may keep ordinary mutable state between scrapes.
pub trait Probe: Send + 'static {
    /// Stable registry key, also used to label the scrape meta-metrics.
    fn name(&self) -> &str;

    /// Observe the current system state and emit samples into `sink`.
    ///
    /// An entity that can be read at all must have every one of its metrics
    /// emitted in the same update.
    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError>;
}
