//! Tailwatch - real-time log file monitoring with sliding-window alerts.

pub mod alert;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod line_buffer;
pub mod metrics;
pub mod pattern;
pub mod record;
pub mod source;
pub mod summary;
pub mod window;

// Re-export commonly used types
pub use alert::{Alert, AlertState, AlertStore, Upsert};
pub use analyzer::{LogAnalyzer, TimeRange, analyze};
pub use cli::LogFormat;
pub use engine::{MonitorEngine, MonitorEngineBuilder};
pub use handler::{
    AlertHandler, AlertQueue, DEFAULT_QUEUE_CAPACITY, DispatchWorker, FnHandler, LogHandler,
    WebhookHandler,
};
pub use line_buffer::LineBuffer;
pub use crate::metrics::{MetricsServer, register_metric_descriptions};
pub use pattern::{LineMatcher, PatternSpec, Severity, default_patterns};
pub use record::LogRecord;
pub use source::{LineSource, StartPosition};
pub use summary::{AnalysisReport, ErrorFrequency, MetricsSummary};
pub use window::WindowCounter;
