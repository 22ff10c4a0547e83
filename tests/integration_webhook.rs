//! Integration tests for webhook delivery.
//!
//! Uses wiremock to simulate the receiving endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tailwatch::config::WebhookHandlerConfig;
use tailwatch::error::HandlerError;
use tailwatch::{Alert, AlertHandler, AlertQueue, AlertStore, DispatchWorker, PatternSpec, Severity, WebhookHandler};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_alert(pattern_name: &str) -> Alert {
    let pattern = PatternSpec::regex(
        pattern_name,
        "connection refused",
        Severity::Error,
        3,
        Duration::from_secs(300),
    )
    .unwrap();
    AlertStore::new()
        .upsert(&pattern, 3, Utc::now(), "ERROR connection refused")
        .alert()
        .clone()
}

fn make_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to create client")
}

fn webhook(url: String, method: &str, body_template: Option<&str>) -> WebhookHandler {
    let config = WebhookHandlerConfig {
        name: "ops".to_string(),
        url,
        method: method.to_string(),
        headers: HashMap::from([("X-Source".to_string(), "tailwatch".to_string())]),
        body_template: body_template.map(str::to_string),
    };
    WebhookHandler::from_config(&config, make_client()).expect("valid webhook config")
}

#[tokio::test]
async fn default_payload_is_posted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/alerts"))
        .and(header("content-type", "application/json"))
        .and(header("x-source", "tailwatch"))
        .and(body_partial_json(serde_json::json!({
            "handler": "ops",
            "alert": {
                "pattern_name": "db_errors",
                "severity": "ERROR",
                "state": "TRIGGERED",
                "count": 3
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handler = webhook(format!("{}/hooks/alerts", server.uri()), "POST", None);
    handler.handle(&make_alert("db_errors")).await.unwrap();
}

#[tokio::test]
async fn body_template_is_rendered() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(body_partial_json(serde_json::json!({
            "text": "[ERROR] db_errors x3"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let handler = webhook(
        server.uri(),
        "PUT",
        Some(r#"{"text": "[{{ severity }}] {{ pattern_name }} x{{ count }}"}"#),
    );
    handler.handle(&make_alert("db_errors")).await.unwrap();
}

#[tokio::test]
async fn server_error_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handler = webhook(server.uri(), "POST", None);
    handler.handle(&make_alert("db_errors")).await.unwrap();
}

#[tokio::test]
async fn persistent_server_error_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let handler = webhook(server.uri(), "POST", None);
    let err = handler.handle(&make_alert("db_errors")).await.unwrap_err();
    assert!(matches!(err, HandlerError::MaxRetriesExceeded));
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let handler = webhook(server.uri(), "POST", None);
    let err = handler.handle(&make_alert("db_errors")).await.unwrap_err();
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn worker_delivers_queued_alerts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let queue = AlertQueue::new(10);
    let handler: Arc<dyn AlertHandler> = Arc::new(webhook(server.uri(), "POST", None));
    let mut worker = DispatchWorker::new(&queue, Arc::new(vec![handler]));
    let task = tokio::spawn(async move { worker.run().await });

    queue.send(make_alert("db_errors")).unwrap();
    queue.send(make_alert("slow_queries")).unwrap();
    drop(queue);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("worker should finish once the queue is drained")
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(first["alert"]["pattern_name"], "db_errors");
}
