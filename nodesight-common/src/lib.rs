//! NodeSight Common Library
//!
//! Core of the NodeSight node exporter:
//!
//! - [`descriptor`] - Typed metric descriptors and samples
//! - [`probe`] - The contract every leaf probe implements
//! - [`registry`] - Probe registrations, enablement and construction
//! - [`engine`] - Scrape-cycle execution with per-probe isolation
//! - [`config`] - Logging configuration
//! - [`error`] - Error types

pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod probe;
pub mod registry;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig};
pub use descriptor::{MetricDescriptor, NAMESPACE, Sample, ValueKind, build_fq_name};
pub use engine::{CycleReport, Engine, EngineConfig, ExecutionMode, ScrapeResult};
pub use error::{Error, Result};
pub use probe::{Probe, ProbeError, SampleSink};
pub use registry::{Constructor, ProbeInstance, ProbeRegistration, Registry, RegistryError};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
