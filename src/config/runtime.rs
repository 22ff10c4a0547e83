//! Runtime configuration with compiled patterns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::handlers::HandlersConfig;
use super::types::{Config, MetricsConfig};
use crate::error::ConfigError;
use crate::handler::{AlertHandler, LogHandler, WebhookHandler};
use crate::pattern::{PatternSpec, default_patterns, ensure_unique_names};
use crate::source::StartPosition;

/// Validated configuration, ready to drive a `MonitorEngine`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub path: PathBuf,
    pub poll_interval: Duration,
    pub start_at: StartPosition,
    /// Defaults first, then enabled custom patterns in file order.
    pub patterns: Vec<PatternSpec>,
    pub handlers: HandlersConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Compile patterns into their runtime form.
    ///
    /// Call [`Config::validate`] first to get every error at once; this
    /// stops at the first one.
    pub fn compile(self) -> Result<RuntimeConfig, ConfigError> {
        let mut patterns = if self.patterns.include_defaults {
            default_patterns()
        } else {
            Vec::new()
        };

        for pattern in self.patterns.custom.iter().filter(|p| p.enabled) {
            patterns.push(pattern.to_spec()?);
        }
        ensure_unique_names(&patterns)?;

        Ok(RuntimeConfig {
            path: self.source.path,
            poll_interval: self.source.poll_interval,
            start_at: self.source.start_at,
            patterns,
            handlers: self.handlers,
            metrics: self.metrics,
        })
    }
}

impl RuntimeConfig {
    /// Instantiate the configured alert handlers.
    ///
    /// # Errors
    /// Returns every handler that could not be built.
    pub fn build_handlers(
        &self,
        client: reqwest::Client,
    ) -> Result<Vec<Arc<dyn AlertHandler>>, Vec<ConfigError>> {
        let mut handlers: Vec<Arc<dyn AlertHandler>> = Vec::new();
        let mut errors = Vec::new();

        if self.handlers.log {
            handlers.push(Arc::new(LogHandler));
        }

        for webhook in &self.handlers.webhooks {
            match WebhookHandler::from_config(webhook, client.clone()) {
                Ok(handler) => {
                    tracing::info!(
                        handler = %webhook.name,
                        method = %webhook.method,
                        "Registered webhook handler"
                    );
                    handlers.push(Arc::new(handler));
                }
                Err(e) => {
                    metrics::counter!(
                        "tailwatch_handler_config_errors_total",
                        "handler" => webhook.name.clone()
                    )
                    .increment(1);
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(handlers)
        } else {
            Err(errors)
        }
    }
}
