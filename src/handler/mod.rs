//! Alert handlers and their asynchronous dispatch.
//!
//! Handlers receive every newly TRIGGERED alert exactly once. They never run
//! on the matching path: the monitor loop pushes alerts into an
//! [`AlertQueue`] and a [`DispatchWorker`] task invokes the handlers.
//!
//! ```text
//! monitor loop -> AlertQueue (broadcast, drop oldest) -> DispatchWorker -> handlers
//! ```

mod queue;
mod webhook;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::alert::Alert;
use crate::error::HandlerError;

pub use queue::{AlertQueue, DEFAULT_QUEUE_CAPACITY, DispatchWorker};
pub use webhook::{DefaultWebhookPayload, WebhookHandler};

/// Something that reacts to a newly triggered alert.
///
/// Implementations must be `Send + Sync`; one instance is shared by the
/// dispatch worker for the whole lifetime of the engine. Retries, if any,
/// are the handler's own business.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Name used in logs and metrics labels.
    fn name(&self) -> &str;

    /// React to one alert.
    async fn handle(&self, alert: &Alert) -> Result<(), HandlerError>;
}

impl fmt::Debug for dyn AlertHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertHandler")
            .field("name", &self.name())
            .finish()
    }
}

/// Shared, ordered list of handlers.
pub type Handlers = Arc<Vec<Arc<dyn AlertHandler>>>;

/// Adapter turning a plain closure into a handler.
///
/// ```
/// use tailwatch::handler::FnHandler;
///
/// let handler = FnHandler::new("stdout", |alert| {
///     println!("{} fired", alert.pattern_name);
/// });
/// ```
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Alert) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> AlertHandler for FnHandler<F>
where
    F: Fn(&Alert) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, alert: &Alert) -> Result<(), HandlerError> {
        (self.f)(alert);
        Ok(())
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// Emits each alert as a structured `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct LogHandler;

#[async_trait]
impl AlertHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, alert: &Alert) -> Result<(), HandlerError> {
        tracing::warn!(
            alert_id = %alert.id,
            pattern = %alert.pattern_name,
            severity = %alert.severity,
            count = alert.count,
            threshold = alert.threshold,
            sample = %alert.sample,
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// Calculate exponential backoff delay: `min(base * 2^attempt, max)`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = base.saturating_mul(2_u32.saturating_pow(attempt));
    std::cmp::min(delay, max)
}
