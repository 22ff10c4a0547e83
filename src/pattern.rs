//! Monitored patterns and the matchers behind them.
//!
//! A [`PatternSpec`] is immutable once built. Its matcher is any
//! [`LineMatcher`]: text regexes and structured-field regexes share the same
//! `matches` capability, so the engine never needs to know which kind of log
//! payload it is looking at.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::record::LogRecord;

/// Severity of a pattern, an alert, or a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Map a log level name (`warn`, `ERROR`, `fatal`, ...) to a severity.
    pub fn from_level_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "INFO" | "INFORMATION" | "NOTICE" => Some(Severity::Info),
            "WARN" | "WARNING" => Some(Severity::Warning),
            "ERR" | "ERROR" => Some(Severity::Error),
            "CRIT" | "CRITICAL" | "FATAL" | "EMERG" | "ALERT" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(format!(
                "unknown severity '{}': expected info, warning, error or critical",
                other
            )),
        }
    }
}

/// Single matching capability shared by every kind of pattern.
///
/// Implementations must be cheap to call; the engine evaluates every
/// registered matcher against every new line.
pub trait LineMatcher: Send + Sync + fmt::Debug {
    /// Whether the line satisfies this matcher.
    fn matches(&self, record: &LogRecord<'_>) -> bool;

    /// Source text of the matcher, for alert details and diagnostics.
    fn describe(&self) -> String;
}

/// Regex searched anywhere in the raw line.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl LineMatcher for RegexMatcher {
    fn matches(&self, record: &LogRecord<'_>) -> bool {
        self.regex.is_match(record.raw())
    }

    fn describe(&self) -> String {
        self.regex.as_str().to_string()
    }
}

/// Regex searched in one field of a structured record.
///
/// Text lines never match.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    field: String,
    regex: Regex,
}

impl FieldMatcher {
    pub fn new(field: impl Into<String>, regex: Regex) -> Self {
        Self {
            field: field.into(),
            regex,
        }
    }
}

impl LineMatcher for FieldMatcher {
    fn matches(&self, record: &LogRecord<'_>) -> bool {
        record
            .field_text(&self.field)
            .is_some_and(|value| self.regex.is_match(&value))
    }

    fn describe(&self) -> String {
        format!("{} =~ {}", self.field, self.regex.as_str())
    }
}

/// Compile a pattern regex, case-insensitive unless asked otherwise.
pub fn compile_regex(name: &str, source: &str, case_sensitive: bool) -> Result<Regex, PatternError> {
    RegexBuilder::new(source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| PatternError::Compile {
            name: name.to_string(),
            message: e.to_string(),
        })
}

/// Immutable description of one monitored pattern.
#[derive(Clone)]
pub struct PatternSpec {
    name: String,
    matcher: Arc<dyn LineMatcher>,
    severity: Severity,
    threshold: u32,
    window: Duration,
}

impl PatternSpec {
    /// Build a pattern around any matcher.
    ///
    /// # Errors
    ///
    /// Rejects an empty name, a zero threshold, or a zero window.
    pub fn new(
        name: impl Into<String>,
        matcher: Arc<dyn LineMatcher>,
        severity: Severity,
        threshold: u32,
        window: Duration,
    ) -> Result<Self, PatternError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PatternError::EmptyName);
        }
        if threshold == 0 {
            return Err(PatternError::InvalidThreshold { name });
        }
        if window.is_zero() {
            return Err(PatternError::InvalidWindow { name });
        }
        Ok(Self {
            name,
            matcher,
            severity,
            threshold,
            window,
        })
    }

    /// Build a case-insensitive raw-line regex pattern.
    pub fn regex(
        name: impl Into<String>,
        source: &str,
        severity: Severity,
        threshold: u32,
        window: Duration,
    ) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = compile_regex(&name, source, false)?;
        Self::new(name, Arc::new(RegexMatcher::new(regex)), severity, threshold, window)
    }

    /// Build a case-insensitive regex pattern over a structured field.
    pub fn field(
        name: impl Into<String>,
        field: &str,
        source: &str,
        severity: Severity,
        threshold: u32,
        window: Duration,
    ) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = compile_regex(&name, source, false)?;
        Self::new(
            name,
            Arc::new(FieldMatcher::new(field, regex)),
            severity,
            threshold,
            window,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn matcher(&self) -> &Arc<dyn LineMatcher> {
        &self.matcher
    }

    pub fn matches(&self, record: &LogRecord<'_>) -> bool {
        self.matcher.matches(record)
    }
}

impl fmt::Debug for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSpec")
            .field("name", &self.name)
            .field("matcher", &self.matcher.describe())
            .field("severity", &self.severity)
            .field("threshold", &self.threshold)
            .field("window", &self.window)
            .finish()
    }
}

/// Reject duplicate names in a pattern set.
pub fn ensure_unique_names(patterns: &[PatternSpec]) -> Result<(), PatternError> {
    let mut seen = std::collections::HashSet::new();
    for pattern in patterns {
        if !seen.insert(pattern.name()) {
            return Err(PatternError::Duplicate(pattern.name().to_string()));
        }
    }
    Ok(())
}

const fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Built-in catalogue of common failure signatures.
///
/// | name                       | severity | threshold | window |
/// |----------------------------|----------|-----------|--------|
/// | high_error_rate            | CRITICAL | 10        | 5m     |
/// | database_connection_errors | ERROR    | 3         | 5m     |
/// | memory_pressure            | CRITICAL | 1         | 1m     |
/// | authentication_failures    | WARNING  | 5         | 10m    |
/// | api_rate_limiting          | WARNING  | 3         | 5m     |
/// | slow_queries               | WARNING  | 5         | 5m     |
pub fn default_patterns() -> Vec<PatternSpec> {
    let catalogue: [(&str, &str, Severity, u32, Duration); 6] = [
        (
            "high_error_rate",
            r#""level"\s*:\s*"error""#,
            Severity::Critical,
            10,
            minutes(5),
        ),
        (
            "database_connection_errors",
            r"database.*connection.*error|connection.*refused|timeout.*database",
            Severity::Error,
            3,
            minutes(5),
        ),
        (
            "memory_pressure",
            r"memory.*leak|out of memory|memory.*exceeded",
            Severity::Critical,
            1,
            minutes(1),
        ),
        (
            "authentication_failures",
            r"authentication.*failed|invalid.*credentials|unauthorized",
            Severity::Warning,
            5,
            minutes(10),
        ),
        (
            "api_rate_limiting",
            r"rate.*limit|too many requests|\b429\b",
            Severity::Warning,
            3,
            minutes(5),
        ),
        (
            "slow_queries",
            r"slow query|query took \d+\s*ms|statement timeout",
            Severity::Warning,
            5,
            minutes(5),
        ),
    ];

    catalogue
        .into_iter()
        .map(|(name, source, severity, threshold, window)| {
            PatternSpec::regex(name, source, severity, threshold, window)
                .expect("built-in pattern is valid")
        })
        .collect()
}
