//! End-to-end tests: configuration file to engine to handlers.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tailwatch::config::Config;
use tailwatch::{Alert, AlertState, FnHandler, MonitorEngine, PatternSpec, Severity, StartPosition};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn append(path: &Path, content: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn config_driven_engine_posts_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({
            "alert": { "pattern_name": "db_errors", "count": 2 }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, "2026-01-09 10:00:00 INFO old line, connection refused\n");

    let yaml = format!(
        r#"
source:
  path: {log}
  poll_interval: 20ms
  start_at: end
patterns:
  include_defaults: false
  custom:
    - name: db_errors
      regex: "connection refused"
      severity: error
      threshold: 2
      window: 5m
handlers:
  log: true
  webhooks:
    - name: ops
      url: "{uri}/alerts"
"#,
        log = log.display(),
        uri = server.uri()
    );
    let config = Config::from_yaml(&yaml).unwrap();
    config.validate().unwrap();
    let runtime = config.compile().unwrap();
    let handlers = runtime.build_handlers(reqwest::Client::new()).unwrap();
    assert_eq!(handlers.len(), 2);

    let engine = MonitorEngine::from_config(&runtime, handlers).unwrap();
    engine.start().unwrap();

    // Let the first poll position at the end of the existing content.
    tokio::time::sleep(Duration::from_millis(60)).await;
    append(&log, "ERROR connection refused\nERROR connection refused\nERROR connection refused\n");

    assert!(wait_until(|| engine.metrics_summary().lines_processed == 3).await);
    for _ in 0..100 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    engine.stop().await;

    let active = engine.active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].pattern_name, "db_errors");
    assert_eq!(active[0].count, 3);
    assert_eq!(active[0].severity, Severity::Error);

    let summary = engine.metrics_summary();
    assert_eq!(summary.error_count, 3);
    assert_eq!(summary.matches_by_pattern["db_errors"], 3);
    assert_eq!(summary.alert_count_by_severity[&Severity::Error], 1);
}

#[tokio::test]
async fn rotation_is_followed() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, "");

    let fired: Arc<Mutex<Vec<Alert>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let engine = MonitorEngine::builder(&log)
        .poll_interval(Duration::from_millis(20))
        .start_at(StartPosition::Beginning)
        .pattern(
            PatternSpec::regex("oom", "out of memory", Severity::Critical, 1, Duration::from_secs(60))
                .unwrap(),
        )
        .handler(Arc::new(FnHandler::new("collect", move |alert: &Alert| {
            sink.lock().unwrap().push(alert.clone());
        })))
        .build()
        .unwrap();
    engine.start().unwrap();

    append(&log, "INFO a fairly long line that pads the file before rotation\n");
    assert!(wait_until(|| engine.metrics_summary().lines_processed == 1).await);

    // Rotate: move the old file away and start a fresh, shorter one.
    std::fs::rename(&log, dir.path().join("app.log.1")).unwrap();
    append(&log, "out of memory\n");

    assert!(wait_until(|| fired.lock().unwrap().len() == 1).await);
    engine.stop().await;

    assert_eq!(engine.metrics_summary().lines_processed, 2);
    assert_eq!(fired.lock().unwrap()[0].pattern_name, "oom");
}

#[tokio::test]
async fn operator_workflow_acknowledge_then_resolve() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("app.log");
    append(&log, "");

    let engine = MonitorEngine::builder(&log)
        .poll_interval(Duration::from_millis(20))
        .start_at(StartPosition::Beginning)
        .build()
        .unwrap();
    engine.start().unwrap();

    append(&log, "FATAL out of memory: killed process 4242\n");
    assert!(wait_until(|| !engine.active_alerts().is_empty()).await);

    let alert = engine.active_alerts().remove(0);
    assert_eq!(alert.pattern_name, "memory_pressure");
    assert_eq!(alert.severity, Severity::Critical);

    let acked = engine.acknowledge(&alert.id).unwrap();
    assert_eq!(acked.state, AlertState::Acknowledged);
    let resolved = engine.resolve(&alert.id).unwrap();
    assert_eq!(resolved.state, AlertState::Resolved);
    assert!(engine.resolve(&alert.id).is_err());
    assert!(engine.acknowledge(&alert.id).is_err());

    // A new match after resolution raises a fresh alert.
    append(&log, "out of memory again\n");
    assert!(wait_until(|| !engine.active_alerts().is_empty()).await);
    engine.stop().await;

    let fresh = engine.active_alerts().remove(0);
    assert_ne!(fresh.id, alert.id);
    assert_eq!(engine.alert_history().len(), 2);
    assert_eq!(engine.alert_history()[0].id, fresh.id);
}
