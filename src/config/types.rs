//! Core configuration types and loading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::handlers::{HandlersConfig, default_true};
use super::validation::{validate_jinja_template, validate_template_render};
use crate::error::{ConfigError, PatternError};
use crate::pattern::{
    FieldMatcher, LineMatcher, PatternSpec, RegexMatcher, Severity, compile_regex,
    default_patterns,
};
use crate::source::StartPosition;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tailwatch/config.yaml";

/// Default interval between two polls of the monitored file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Main configuration structure for tailwatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Monitored file.
    pub source: SourceConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Monitored file settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub start_at: StartPosition,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Which patterns to monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternsConfig {
    /// Include the built-in catalogue.
    #[serde(default = "default_true")]
    pub include_defaults: bool,
    #[serde(default)]
    pub custom: Vec<PatternConfig>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            custom: Vec::new(),
        }
    }
}

/// One user-defined pattern.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternConfig {
    pub name: String,
    pub regex: String,
    /// Match this field of JSON lines (dot path) instead of the raw line.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    pub severity: String,
    pub threshold: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PatternConfig {
    /// Build the runtime pattern.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` for an unknown severity,
    /// `ConfigError::Pattern` for anything `PatternSpec` rejects.
    pub fn to_spec(&self) -> Result<PatternSpec, ConfigError> {
        let severity: Severity = self.severity.parse().map_err(|e| {
            ConfigError::ValidationError(format!("pattern '{}': {}", self.name, e))
        })?;
        let regex = compile_regex(&self.name, &self.regex, self.case_sensitive)?;
        let matcher: Arc<dyn LineMatcher> = match &self.field {
            Some(field) => Arc::new(FieldMatcher::new(field, regex)),
            None => Arc::new(RegexMatcher::new(regex)),
        };
        Ok(PatternSpec::new(
            self.name.clone(),
            matcher,
            severity,
            self.threshold,
            self.window,
        )?)
    }
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Validate the whole file, disabled patterns included.
    ///
    /// # Errors
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.source.path.as_os_str().is_empty() {
            errors.push(ConfigError::ValidationError(
                "source.path cannot be empty".to_string(),
            ));
        }
        if self.source.poll_interval.is_zero() {
            errors.push(ConfigError::ValidationError(
                "source.poll_interval must be greater than zero".to_string(),
            ));
        }

        let mut names: HashSet<String> = HashSet::new();
        if self.patterns.include_defaults {
            names.extend(default_patterns().iter().map(|p| p.name().to_string()));
        }

        for pattern in &self.patterns.custom {
            if let Err(e) = pattern.to_spec() {
                errors.push(e);
            }
            if !pattern.name.trim().is_empty() && !names.insert(pattern.name.clone()) {
                errors.push(PatternError::Duplicate(pattern.name.clone()).into());
            }
        }

        if !self.patterns.include_defaults
            && !self.patterns.custom.iter().any(|p| p.enabled)
        {
            errors.push(ConfigError::ValidationError(
                "no enabled patterns: set patterns.include_defaults or add a custom pattern"
                    .to_string(),
            ));
        }

        if self.handlers.queue_capacity == 0 {
            errors.push(ConfigError::ValidationError(
                "handlers.queue_capacity must be greater than zero".to_string(),
            ));
        }

        let mut webhook_names = HashSet::new();
        for webhook in &self.handlers.webhooks {
            let name = webhook.name.as_str();
            if name.trim().is_empty() {
                errors.push(ConfigError::ValidationError(
                    "webhook name cannot be empty".to_string(),
                ));
            } else if !webhook_names.insert(name) {
                errors.push(ConfigError::InvalidHandler {
                    name: name.to_string(),
                    message: "duplicate handler name".to_string(),
                });
            }

            if webhook.url.trim().is_empty() {
                errors.push(ConfigError::InvalidHandler {
                    name: name.to_string(),
                    message: "url cannot be empty".to_string(),
                });
            }

            let method = webhook.method.to_uppercase();
            if method != "POST" && method != "PUT" {
                errors.push(ConfigError::InvalidHandler {
                    name: name.to_string(),
                    message: format!(
                        "unsupported method '{}': only POST and PUT are supported",
                        webhook.method
                    ),
                });
            }

            if let Some(template) = &webhook.body_template
                && let Err(e) =
                    validate_jinja_template(template).and_then(|()| validate_template_render(template))
            {
                errors.push(ConfigError::InvalidHandler {
                    name: name.to_string(),
                    message: format!("body_template: {}", e),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
