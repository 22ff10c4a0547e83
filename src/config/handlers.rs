//! Alert handler configuration types.

use std::collections::HashMap;

use serde::Deserialize;

use crate::handler::DEFAULT_QUEUE_CAPACITY;

pub(crate) fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_method() -> String {
    "POST".to_string()
}

/// Handlers invoked on each newly triggered alert.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlersConfig {
    /// Emit alerts as structured log events.
    #[serde(default = "default_true")]
    pub log: bool,
    /// Capacity of the dispatch queue; the oldest alert is dropped when full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub webhooks: Vec<WebhookHandlerConfig>,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            log: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            webhooks: Vec::new(),
        }
    }
}

/// Generic HTTP webhook.
///
/// `url` and header values may reference environment variables as `${VAR}`;
/// they are resolved when the handler is built.
///
/// ```yaml
/// webhooks:
///   - name: ops
///     url: "https://hooks.example.com/${HOOK_TOKEN}"
///     method: POST
///     headers:
///       Authorization: "Bearer ${API_TOKEN}"
///     body_template: '{"text": "{{ severity }}: {{ message }}"}'
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookHandlerConfig {
    pub name: String,
    pub url: String,
    /// POST or PUT.
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// minijinja template rendered with the alert's fields.
    #[serde(default)]
    pub body_template: Option<String>,
}
