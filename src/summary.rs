//! Line statistics and the reports built from them.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::Alert;
use crate::pattern::Severity;

/// Running counters over processed lines.
///
/// The monitor loop and the batch analyzer both feed one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineStats {
    pub lines_processed: u64,
    pub error_count: u64,
    pub warning_count: u64,
    pub critical_count: u64,
    pub matches_by_pattern: BTreeMap<String, u64>,
}

impl LineStats {
    /// Count one line with the given level.
    pub fn observe(&mut self, level: Option<Severity>) {
        self.lines_processed += 1;
        match level {
            Some(Severity::Error) => self.error_count += 1,
            Some(Severity::Warning) => self.warning_count += 1,
            Some(Severity::Critical) => self.critical_count += 1,
            Some(Severity::Info) | None => {}
        }
    }

    pub fn record_match(&mut self, pattern_name: &str) {
        *self
            .matches_by_pattern
            .entry(pattern_name.to_string())
            .or_default() += 1;
    }

    /// Snapshot these counters together with the current alert state.
    ///
    /// `observed_for` is how long lines have been collected; it drives
    /// `log_rate_per_minute`.
    pub fn summarize(
        &self,
        active_alerts: Vec<Alert>,
        alert_count_by_severity: HashMap<Severity, usize>,
        observed_for: Duration,
    ) -> MetricsSummary {
        MetricsSummary {
            generated_at: Utc::now(),
            lines_processed: self.lines_processed,
            log_rate_per_minute: rate_per_minute(self.lines_processed, observed_for),
            error_count: self.error_count,
            warning_count: self.warning_count,
            critical_count: self.critical_count,
            alert_count_by_severity: alert_count_by_severity.into_iter().collect(),
            matches_by_pattern: self.matches_by_pattern.clone(),
            active_alerts,
        }
    }
}

/// Point-in-time view of what the engine (or analyzer) has seen.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub generated_at: DateTime<Utc>,
    pub lines_processed: u64,
    /// Lines per minute over the observation period, 0 when it is empty.
    pub log_rate_per_minute: f64,
    pub error_count: u64,
    pub warning_count: u64,
    pub critical_count: u64,
    /// Non-resolved alerts per severity.
    pub alert_count_by_severity: BTreeMap<Severity, usize>,
    pub matches_by_pattern: BTreeMap<String, u64>,
    pub active_alerts: Vec<Alert>,
}

/// One entry of the error frequency ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFrequency {
    pub message: String,
    pub count: u64,
}

/// Result of a batch analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub summary: MetricsSummary,
    /// Every line read, including skipped ones.
    pub total_lines: u64,
    /// Lines skipped because no timestamp could be attributed to them.
    pub skipped_lines: u64,
    pub unique_error_count: usize,
    /// Most frequent error messages, at most ten.
    pub top_errors: Vec<ErrorFrequency>,
    /// Lines per hour bucket, keyed `YYYY-MM-DD HH:00`.
    pub hourly_distribution: BTreeMap<String, u64>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

fn rate_per_minute(lines: u64, period: Duration) -> f64 {
    let minutes = period.as_secs_f64() / 60.0;
    if minutes > 0.0 {
        lines as f64 / minutes
    } else {
        0.0
    }
}

/// Rank messages by count, descending, then alphabetically. Keeps `limit`.
pub fn rank_errors(counts: HashMap<String, u64>, limit: usize) -> Vec<ErrorFrequency> {
    let mut ranked: Vec<ErrorFrequency> = counts
        .into_iter()
        .map(|(message, count)| ErrorFrequency { message, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    ranked.truncate(limit);
    ranked
}
