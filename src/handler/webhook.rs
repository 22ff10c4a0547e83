//! HTTP webhook alert handler.
//!
//! Posts each alert to an arbitrary endpoint. The body is either the alert as
//! JSON or a minijinja `body_template` rendered with the alert's fields.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use minijinja::Environment;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::Instrument;

use super::{AlertHandler, backoff_delay};
use crate::alert::Alert;
use crate::config::{SecretString, WebhookHandlerConfig, resolve_env_vars, validate_jinja_template};
use crate::error::{ConfigError, HandlerError};

const WEBHOOK_BACKOFF_BASE: Duration = Duration::from_millis(500);
const WEBHOOK_BACKOFF_MAX: Duration = Duration::from_secs(5);
const WEBHOOK_MAX_RETRIES: u32 = 3;

/// Body sent when no `body_template` is configured.
#[derive(Debug, Clone, Serialize)]
pub struct DefaultWebhookPayload<'a> {
    /// Name of the handler that sent this alert.
    pub handler: &'a str,
    /// RFC 3339 time of sending.
    pub sent_at: String,
    pub alert: &'a Alert,
}

/// Webhook handler.
///
/// # Retry policy
///
/// - **5xx** and network errors are retried with exponential backoff
/// - **4xx** is a permanent failure and is not retried
pub struct WebhookHandler {
    name: String,
    client: reqwest::Client,
    url: SecretString,
    method: Method,
    headers: HeaderMap,
    body_template: Option<String>,
}

fn invalid(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidHandler {
        name: name.to_string(),
        message: message.into(),
    }
}

fn render_body_template(source: &str, alert: &Alert) -> Result<String, HandlerError> {
    let mut env = Environment::new();
    env.add_template("body", source)
        .map_err(|e| HandlerError::Failed(format!("template error: {}", e)))?;
    env.get_template("body")
        .and_then(|tmpl| tmpl.render(alert))
        .map_err(|e| HandlerError::Failed(format!("template render error: {}", e)))
}

impl WebhookHandler {
    /// Build a handler from configuration, resolving `${VAR}` references in
    /// the URL and header values.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidHandler` on an unresolvable variable, a method
    /// other than POST/PUT, a bad header, or a template syntax error.
    pub fn from_config(
        config: &WebhookHandlerConfig,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let name = config.name.as_str();

        let url = resolve_env_vars(&config.url).map_err(|e| invalid(name, format!("url: {}", e)))?;
        if url.trim().is_empty() {
            return Err(invalid(name, "url cannot be empty"));
        }

        let method = match config.method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            _ => {
                return Err(invalid(
                    name,
                    format!(
                        "unsupported method '{}': only POST and PUT are supported",
                        config.method
                    ),
                ));
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            let resolved = resolve_env_vars(value)
                .map_err(|e| invalid(name, format!("header '{}': {}", key, e)))?;
            let header_name = HeaderName::from_str(key)
                .map_err(|_| invalid(name, format!("invalid header name: {}", key)))?;
            let header_value = HeaderValue::from_str(&resolved)
                .map_err(|_| invalid(name, format!("invalid header value for '{}'", key)))?;
            headers.insert(header_name, header_value);
        }

        if let Some(template) = &config.body_template {
            validate_jinja_template(template)
                .map_err(|e| invalid(name, format!("body_template: {}", e)))?;
        }

        Ok(Self {
            name: name.to_string(),
            client,
            url: SecretString::new(url),
            method,
            headers,
            body_template: config.body_template.clone(),
        })
    }

    fn body(&self, alert: &Alert) -> Result<String, HandlerError> {
        match &self.body_template {
            Some(source) => render_body_template(source, alert),
            None => {
                let payload = DefaultWebhookPayload {
                    handler: &self.name,
                    sent_at: Utc::now().to_rfc3339(),
                    alert,
                };
                serde_json::to_string(&payload)
                    .map_err(|e| HandlerError::Failed(format!("JSON serialization error: {}", e)))
            }
        }
    }

    fn record_failure(&self, alert: &Alert) {
        metrics::counter!(
            "tailwatch_webhook_errors_total",
            "handler" => self.name.clone(),
            "pattern" => alert.pattern_name.clone()
        )
        .increment(1);
    }

    #[cfg(test)]
    pub(crate) fn method(&self) -> &Method {
        &self.method
    }

    #[cfg(test)]
    pub(crate) fn url(&self) -> &str {
        self.url.expose()
    }
}

#[async_trait]
impl AlertHandler for WebhookHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, alert: &Alert) -> Result<(), HandlerError> {
        let span = tracing::info_span!(
            "send_webhook",
            handler = %self.name,
            alert_id = %alert.id
        );

        async {
            let body = self.body(alert)?;

            for attempt in 0..WEBHOOK_MAX_RETRIES {
                match self
                    .client
                    .request(self.method.clone(), self.url.expose())
                    .headers(self.headers.clone())
                    .body(body.clone())
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => {
                        tracing::debug!("Webhook delivered");
                        metrics::counter!(
                            "tailwatch_webhook_sent_total",
                            "handler" => self.name.clone()
                        )
                        .increment(1);
                        return Ok(());
                    }
                    Ok(response) if response.status().is_client_error() => {
                        let status = response.status();
                        tracing::error!(status = %status, "Webhook rejected alert, not retrying");
                        self.record_failure(alert);
                        return Err(HandlerError::Failed(format!("client error: {}", status)));
                    }
                    Ok(response) => {
                        tracing::warn!(
                            attempt = attempt,
                            status = %response.status(),
                            "Webhook returned server error, retrying"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(attempt = attempt, error = %e, "Webhook request failed, retrying");
                    }
                }

                if attempt < WEBHOOK_MAX_RETRIES - 1 {
                    let delay = backoff_delay(attempt, WEBHOOK_BACKOFF_BASE, WEBHOOK_BACKOFF_MAX);
                    tokio::time::sleep(delay).await;
                }
            }

            tracing::error!(max_retries = WEBHOOK_MAX_RETRIES, "Webhook failed after all retries");
            self.record_failure(alert);
            Err(HandlerError::MaxRetriesExceeded)
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URL and headers may carry tokens.
        f.debug_struct("WebhookHandler")
            .field("name", &self.name)
            .field("method", &self.method.as_str())
            .field("has_body_template", &self.body_template.is_some())
            .finish()
    }
}
