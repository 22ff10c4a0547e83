//! Configuration loading and validation for tailwatch.
//!
//! The YAML file is loaded into [`Config`], checked with
//! [`Config::validate`] (which reports every problem at once), then compiled
//! into a [`RuntimeConfig`] holding ready-to-use patterns.

mod env;
mod handlers;
mod runtime;
mod secret;
mod types;
mod validation;

pub use env::resolve_env_vars;
pub use handlers::{HandlersConfig, WebhookHandlerConfig};
pub use runtime::RuntimeConfig;
pub use secret::SecretString;
pub use types::{
    Config, DEFAULT_CONFIG_PATH, DEFAULT_POLL_INTERVAL, MetricsConfig, PatternConfig,
    PatternsConfig, SourceConfig,
};
pub(crate) use validation::validate_jinja_template;
pub use validation::validate_template_render;
