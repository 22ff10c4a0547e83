//! Alert queue and dispatch worker.

use tokio::sync::broadcast;
use tracing::Instrument;

use super::Handlers;
use crate::alert::Alert;
use crate::error::QueueError;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Bounded alert queue on top of a broadcast channel.
///
/// Sending never blocks the monitor loop. When the worker falls behind by
/// more than the capacity, the oldest alerts are overwritten and the worker
/// sees a `Lagged` error, which it counts in
/// `tailwatch_alerts_dropped_total`.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    tx: broadcast::Sender<Alert>,
}

impl AlertQueue {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configuration validation rejects that.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Enqueue an alert (non-blocking).
    ///
    /// # Errors
    ///
    /// `QueueError::Closed` when no worker is subscribed.
    pub fn send(&self, alert: Alert) -> Result<(), QueueError> {
        tracing::trace!(alert_id = %alert.id, "Enqueueing alert");
        self.tx.send(alert).map_err(|_| QueueError::Closed)?;
        metrics::gauge!("tailwatch_queue_size").set(self.tx.len() as f64);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl Default for AlertQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Consumes the queue and runs every handler on each alert, in order.
///
/// A failing handler is logged and counted; it neither stops the worker nor
/// prevents the remaining handlers from running.
pub struct DispatchWorker {
    rx: broadcast::Receiver<Alert>,
    handlers: Handlers,
}

impl DispatchWorker {
    /// Subscribe a worker to `queue`. Alerts sent before this call are not seen.
    pub fn new(queue: &AlertQueue, handlers: Handlers) -> Self {
        Self {
            rx: queue.subscribe(),
            handlers,
        }
    }

    /// Run until every `AlertQueue` clone is dropped.
    ///
    /// Alerts still buffered when the queue closes are dispatched first.
    pub async fn run(&mut self) {
        tracing::debug!(handler_count = self.handlers.len(), "Dispatch worker started");

        loop {
            match self.rx.recv().await {
                Ok(alert) => {
                    self.dispatch(&alert).await;
                    metrics::gauge!("tailwatch_queue_size").set(self.rx.len() as f64);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(dropped_count = n, "Alert queue full, dropped {} oldest alerts", n);
                    metrics::counter!("tailwatch_alerts_dropped_total").increment(n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Alert queue closed, dispatch worker exiting");
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, alert: &Alert) {
        let span = tracing::info_span!(
            "dispatch_alert",
            alert_id = %alert.id,
            pattern = %alert.pattern_name
        );

        async {
            for handler in self.handlers.iter() {
                match handler.handle(alert).await {
                    Ok(()) => {
                        tracing::debug!(handler = %handler.name(), "Alert handled");
                    }
                    Err(e) => {
                        tracing::error!(
                            handler = %handler.name(),
                            error = %e,
                            "Alert handler failed"
                        );
                        metrics::counter!(
                            "tailwatch_handler_failures_total",
                            "handler" => handler.name().to_string()
                        )
                        .increment(1);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
