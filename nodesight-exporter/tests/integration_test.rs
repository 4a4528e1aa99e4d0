//! Integration tests for the node exporter.
//!
//! These run the real probe registry against checked-in fixtures and check
//! the rendered output served over HTTP.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use nodesight_common::Engine;
use nodesight_exporter::{ExporterConfig, HttpServer, create_router};
use tokio::sync::watch;
use tower::ServiceExt;

fn fixtures(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../nodesight-probes/tests/fixtures")
        .join(name)
}

/// Engine with only the fixture-backed probes enabled.
fn fixture_engine() -> Arc<Engine> {
    let mut config = ExporterConfig::default();
    config.probes.qdisc.fixtures = Some(fixtures("qdisc"));
    config.probes.diskstats.fixtures = Some(fixtures("diskstats"));

    let registry = nodesight_probes::registry().unwrap();
    let overrides: BTreeMap<String, bool> = registry
        .names()
        .map(|name| (name.to_string(), matches!(name, "qdisc" | "diskstats")))
        .collect();
    let instances = registry.instantiate(&overrides, &config.probes).unwrap();

    Arc::new(Engine::new(
        instances,
        config.engine.to_engine_config().unwrap(),
    ))
}

async fn scrape(engine: Arc<Engine>) -> (StatusCode, String) {
    let response = create_router(engine, "/metrics")
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Drop the duration series, whose values differ between scrapes.
fn without_durations(body: &str) -> String {
    body.lines()
        .filter(|line| !line.starts_with("node_scrape_collector_duration_seconds{"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_fixture_scrape_output() {
    let (status, body) = scrape(fixture_engine()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("# TYPE node_qdisc_bytes_total counter\n"));
    assert!(body.contains("node_qdisc_bytes_total{device=\"eth0\",kind=\"pfifo\"} 1000\n"));
    assert!(body.contains("node_qdisc_current_queue_length{device=\"eth0\",kind=\"pfifo\"} 5\n"));
    assert!(body.contains("node_qdisc_backlog{device=\"eth0\",kind=\"pfifo\"} 200\n"));
    assert!(!body.contains("kind=\"fq_codel\""));

    assert!(body.contains("# TYPE node_disk_io_now gauge\n"));
    assert!(body.contains("node_disk_reads_completed_total{device=\"sda\"} 25354637\n"));
    assert!(!body.contains("device=\"loop0\""));

    assert!(body.contains("node_scrape_collector_success{collector=\"diskstats\"} 1\n"));
    assert!(body.contains("node_scrape_collector_success{collector=\"qdisc\"} 1\n"));
    assert!(body.contains("node_scrape_collectors_scraped 2\n"));
}

#[tokio::test]
async fn test_each_family_declared_once() {
    let (_, body) = scrape(fixture_engine()).await;

    for family in [
        "node_qdisc_bytes_total",
        "node_disk_read_bytes_total",
        "node_scrape_collector_success",
        "node_scrape_collector_duration_seconds",
    ] {
        let type_lines = body
            .lines()
            .filter(|line| line.starts_with(&format!("# TYPE {family} ")))
            .count();
        assert_eq!(type_lines, 1, "family {family}");
    }
}

#[tokio::test]
async fn test_repeated_scrapes_are_identical() {
    let engine = fixture_engine();

    let (_, first) = scrape(Arc::clone(&engine)).await;
    let (_, second) = scrape(engine).await;

    assert_eq!(without_durations(&first), without_durations(&second));
}

#[tokio::test]
async fn test_missing_fixture_marks_only_that_collector() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ExporterConfig::default();
    config.probes.qdisc.fixtures = Some(dir.path().to_path_buf());
    config.probes.diskstats.fixtures = Some(fixtures("diskstats"));

    let registry = nodesight_probes::registry().unwrap();
    let overrides: BTreeMap<String, bool> = registry
        .names()
        .map(|name| (name.to_string(), matches!(name, "qdisc" | "diskstats")))
        .collect();
    let instances = registry.instantiate(&overrides, &config.probes).unwrap();
    let engine = Arc::new(Engine::new(instances, Default::default()));

    let (status, body) = scrape(engine).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("node_scrape_collector_success{collector=\"qdisc\"} 0\n"));
    assert!(body.contains("node_scrape_collector_success{collector=\"diskstats\"} 1\n"));
    assert!(!body.contains("node_qdisc_bytes_total{"));
}

#[tokio::test]
async fn test_unknown_collector_is_rejected() {
    let registry = nodesight_probes::registry().unwrap();
    let overrides = BTreeMap::from([("does_not_exist".to_string(), true)]);

    let result = registry.instantiate(&overrides, &ExporterConfig::default().probes);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_http_server_serves_metrics() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = HttpServer::new(fixture_engine(), addr, "/metrics".to_string());
    let server_handle = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

    let response = reqwest::Client::new()
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("node_qdisc_packets_total{device=\"wlan0\",kind=\"fq\"} 1\n"));

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
