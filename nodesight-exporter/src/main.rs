//! Prometheus-compatible node exporter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nodesight_common::{Engine, init_tracing};
use tokio::sync::watch;
use tracing::{error, info, warn};

use nodesight_exporter::{ExporterConfig, HttpServer};

/// Prometheus-compatible node exporter.
#[derive(Parser, Debug)]
#[command(name = "nodesight-exporter")]
#[command(about = "Expose host metrics gathered by NodeSight probes")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,

    /// Enable a collector that is disabled by default (repeatable).
    #[arg(long = "collector-enable", value_name = "NAME")]
    enable: Vec<String>,

    /// Disable a collector that is enabled by default (repeatable).
    #[arg(long = "collector-disable", value_name = "NAME")]
    disable: Vec<String>,

    /// Read qdisc statistics from DIR/results.json instead of `tc`.
    #[arg(long, value_name = "DIR")]
    qdisc_fixtures: Option<PathBuf>,

    /// Read disk statistics from DIR/diskstats.json instead of /proc.
    #[arg(long, value_name = "DIR")]
    diskstats_fixtures: Option<PathBuf>,

    /// Print the available collectors with their default state and exit.
    #[arg(long)]
    list_collectors: bool,
}

impl Args {
    /// Layer command-line values over the file configuration.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(listen) = self.listen {
            config.http.listen = listen;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        for name in self.enable {
            config.collectors.insert(name, true);
        }
        for name in self.disable {
            config.collectors.insert(name, false);
        }
        if let Some(dir) = self.qdisc_fixtures {
            config.probes.qdisc.fixtures = Some(dir);
        }
        if let Some(dir) = self.diskstats_fixtures {
            config.probes.diskstats.fixtures = Some(dir);
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let registry = nodesight_probes::registry()?;

    if args.list_collectors {
        for registration in registry.registrations() {
            let state = if registration.default_enabled {
                "enabled"
            } else {
                "disabled"
            };
            println!("{:<12} {}", registration.name, state);
        }
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;

    info!("Starting NodeSight exporter");

    let instances = registry.instantiate(&config.collectors, &config.probes)?;
    let engine = Arc::new(Engine::new(instances, config.engine.to_engine_config()?));

    if engine.is_empty() {
        warn!("No collectors enabled, only scrape meta-metrics will be served");
    }

    let listen_addr = config
        .http
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(engine.clone(), listen_addr, config.http.path.clone());
    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    tokio::select! {
        _ = wait_for_signal() => {}
        result = &mut http_task => {
            // The server only returns early when it failed to start.
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    match tokio::time::timeout(Duration::from_secs(5), http_task).await {
        Ok(Ok(Err(e))) => error!("HTTP server error: {}", e),
        Err(_) => warn!("HTTP server did not stop within 5s"),
        _ => {}
    }

    info!("Exporter stopped");
    Ok(())
}
