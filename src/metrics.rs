//! Prometheus metrics exposition server.
//!
//! Serves the engine's `tailwatch_*` counters and gauges on `/metrics`.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Register HELP text for every metric the crate emits.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        "tailwatch_lines_processed_total",
        "Log lines read from the monitored file"
    );
    describe_counter!(
        "tailwatch_pattern_matches_total",
        "Lines matched per pattern"
    );
    describe_counter!(
        "tailwatch_alerts_created_total",
        "Alerts raised after a pattern crossed its threshold"
    );
    describe_counter!(
        "tailwatch_alerts_resolved_total",
        "Alerts resolved automatically once their window cleared"
    );
    describe_counter!(
        "tailwatch_alerts_dropped_total",
        "Alerts dropped because the handler queue was full"
    );
    describe_counter!(
        "tailwatch_handler_failures_total",
        "Alert handler invocations that returned an error"
    );
    describe_counter!(
        "tailwatch_handler_config_errors_total",
        "Handlers that could not be built from configuration"
    );
    describe_counter!(
        "tailwatch_webhook_sent_total",
        "Webhook deliveries that succeeded"
    );
    describe_counter!(
        "tailwatch_webhook_errors_total",
        "Webhook deliveries that failed after retries"
    );
    describe_counter!(
        "tailwatch_source_errors_total",
        "Polls that failed to read the log file"
    );
    describe_counter!(
        "tailwatch_source_rotations_total",
        "Detected log rotations or truncations"
    );
    describe_counter!(
        "tailwatch_loop_failures_total",
        "Monitor loop tasks that ended abnormally"
    );

    describe_gauge!("tailwatch_active_alerts", "Alerts not yet resolved");
    describe_gauge!("tailwatch_queue_size", "Alerts waiting for handlers");
    describe_gauge!("tailwatch_build_info", "Build information (always 1)");
}

/// Set known metrics to zero so they show up before the first event.
pub fn initialize_metrics(pattern_names: &[&str], handler_names: &[&str]) {
    use metrics::{counter, gauge};

    gauge!("tailwatch_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    gauge!("tailwatch_active_alerts").set(0.0);
    gauge!("tailwatch_queue_size").set(0.0);

    counter!("tailwatch_lines_processed_total").absolute(0);
    counter!("tailwatch_alerts_dropped_total").absolute(0);
    counter!("tailwatch_source_errors_total").absolute(0);
    counter!("tailwatch_source_rotations_total").absolute(0);

    for name in pattern_names {
        counter!("tailwatch_pattern_matches_total", "pattern" => name.to_string()).absolute(0);
    }
    for name in handler_names {
        counter!("tailwatch_handler_failures_total", "handler" => name.to_string()).absolute(0);
    }

    tracing::info!(
        pattern_count = pattern_names.len(),
        handler_count = handler_names.len(),
        "Metrics initialized to zero"
    );
}

/// HTTP server exposing the Prometheus recorder.
pub struct MetricsServer {
    port: u16,
    ready_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsServer {
    /// Port 0 lets the OS choose.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ready_tx: None,
        }
    }

    /// Like [`new`](Self::new), signalling `ready_tx` once the recorder is
    /// installed. Metrics emitted before that are lost.
    pub fn with_ready_signal(port: u16, ready_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self {
            port,
            ready_tx: Some(ready_tx),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Install the global recorder and serve until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot bind or a recorder is already installed.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        register_metric_descriptions();

        if let Some(tx) = self.ready_tx {
            let _ = tx.send(());
        }

        info!(port = self.port, "Metrics server started on /metrics");
        cancel.cancelled().await;
        info!("Metrics server shutting down");

        Ok(())
    }
}
