//! Prometheus-compatible node exporter built on NodeSight probes.
//!
//! Every scrape of the metrics endpoint runs one cycle over the enabled
//! probes and renders the result in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │     Probes      │────>│     Engine      │────>│   HTTP Server   │
//! │ (time, qdisc..) │     │ (one cycle per  │     │   (/metrics)    │
//! │                 │     │     scrape)     │     │                 │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! nodesight-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod exposition;
pub mod http;

pub use config::{ConfigError, EngineSettings, ExporterConfig, HttpConfig};
pub use exposition::render;
pub use http::{HttpServer, create_router};
