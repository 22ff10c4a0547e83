//! Centralized error types for tailwatch using thiserror.
//!
//! Every failure kind the engine can surface lives here so that callers can
//! match on a single set of enums.

use std::path::PathBuf;

use thiserror::Error;

use crate::alert::AlertState;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("invalid handler '{name}': {message}")]
    InvalidHandler { name: String, message: String },
}

/// Errors raised while building a [`PatternSpec`](crate::pattern::PatternSpec).
///
/// These are fatal at startup: the offending pattern is rejected before the
/// monitor loop begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("invalid regex in pattern '{name}': {message}")]
    Compile { name: String, message: String },
    #[error("pattern '{name}': threshold must be at least 1")]
    InvalidThreshold { name: String },
    #[error("pattern '{name}': window must be greater than zero")]
    InvalidWindow { name: String },
    #[error("pattern name cannot be empty")]
    EmptyName,
    #[error("duplicate pattern name '{0}'")]
    Duplicate(String),
}

/// Errors raised while reading the monitored file.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Illegal alert lifecycle transitions requested by a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("alert '{0}' not found")]
    NotFound(String),
    #[error("alert '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: AlertState,
        to: AlertState,
    },
}

/// Errors related to attributing a timestamp to a log line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line carries no timestamp")]
    MissingTimestamp,
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Errors returned by alert handlers.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("max retries exceeded")]
    MaxRetriesExceeded,
}

/// Errors related to the alert dispatch queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("alert queue closed")]
    Closed,
}

/// Errors related to the engine lifecycle.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("monitor engine is already running")]
    AlreadyRunning,
    #[error("monitor engine must be started from within a tokio runtime")]
    NoRuntime,
    #[error("poll interval must be greater than zero")]
    InvalidPollInterval,
    #[error("alert queue capacity must be greater than zero")]
    InvalidQueueCapacity,
    #[error(transparent)]
    Pattern(#[from] PatternError),
}
