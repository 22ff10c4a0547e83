//! Batch analysis of a complete log file.
//!
//! Unlike the monitor, the analyzer keeps no windows and raises no alerts: it
//! reads the file once and reports level counts, pattern match counts, the
//! most frequent error messages and an hourly line distribution.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::SourceError;
use crate::pattern::{PatternSpec, Severity, default_patterns};
use crate::record::LogRecord;
use crate::summary::{AnalysisReport, LineStats, rank_errors};

/// Number of entries kept in [`AnalysisReport::top_errors`].
pub const TOP_ERRORS_LIMIT: usize = 10;

const HOUR_BUCKET_FORMAT: &str = "%Y-%m-%d %H:00";

/// Inclusive time bounds. An open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| ts >= from) && self.to.is_none_or(|to| ts <= to)
    }

    fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Reusable analyzer over a fixed pattern set.
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    patterns: Vec<PatternSpec>,
}

impl Default for LogAnalyzer {
    fn default() -> Self {
        Self::new(default_patterns())
    }
}

impl LogAnalyzer {
    pub fn new(patterns: Vec<PatternSpec>) -> Self {
        Self { patterns }
    }

    /// Read `path` to the end and build a report.
    ///
    /// With a `range`, lines outside it are left out of every count except
    /// `total_lines`, and lines without a usable timestamp are counted in
    /// `skipped_lines`.
    ///
    /// # Errors
    ///
    /// `SourceError::Io` if the file cannot be opened or read.
    pub fn analyze(
        &self,
        path: &Path,
        range: Option<TimeRange>,
    ) -> Result<AnalysisReport, SourceError> {
        let started = Instant::now();
        let range = range.filter(|r| !r.is_unbounded());

        let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
        let mut reader = BufReader::new(file);

        let mut stats = LineStats::default();
        for pattern in &self.patterns {
            stats.matches_by_pattern.insert(pattern.name().to_string(), 0);
        }
        let mut total_lines = 0u64;
        let mut skipped_lines = 0u64;
        let mut errors: HashMap<String, u64> = HashMap::new();
        let mut hourly: BTreeMap<String, u64> = BTreeMap::new();
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| SourceError::io(path, e))?;
            if read == 0 {
                break;
            }
            total_lines += 1;

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            let record = LogRecord::parse(line);

            let timestamp = match (record.timestamp(), range) {
                (Ok(ts), Some(range)) if !range.contains(ts) => continue,
                (Ok(ts), _) => Some(ts),
                (Err(e), Some(_)) => {
                    debug!(line = total_lines, error = %e, "Skipping line without timestamp");
                    skipped_lines += 1;
                    continue;
                }
                (Err(_), None) => None,
            };

            let level = record.level();
            stats.observe(level);
            if level == Some(Severity::Error) {
                *errors.entry(record.message().into_owned()).or_default() += 1;
            }
            if let Some(ts) = timestamp {
                span = Some(match span {
                    Some((first, last)) => (first.min(ts), last.max(ts)),
                    None => (ts, ts),
                });
                *hourly
                    .entry(ts.format(HOUR_BUCKET_FORMAT).to_string())
                    .or_default() += 1;
            }
            for pattern in &self.patterns {
                if pattern.matches(&record) {
                    stats.record_match(pattern.name());
                }
            }
        }

        let unique_error_count = errors.len();
        let zero_alerts = Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let covered = span
            .and_then(|(first, last)| (last - first).to_std().ok())
            .unwrap_or_default();
        let report = AnalysisReport {
            summary: stats.summarize(Vec::new(), zero_alerts, covered),
            total_lines,
            skipped_lines,
            unique_error_count,
            top_errors: rank_errors(errors, TOP_ERRORS_LIMIT),
            hourly_distribution: hourly,
            elapsed: started.elapsed(),
        };

        info!(
            path = %path.display(),
            total_lines = report.total_lines,
            skipped_lines = report.skipped_lines,
            error_count = report.summary.error_count,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Analysis complete"
        );
        Ok(report)
    }
}

/// Analyze `path` with the default pattern catalogue.
pub fn analyze(path: &Path, range: Option<TimeRange>) -> Result<AnalysisReport, SourceError> {
    LogAnalyzer::default().analyze(path, range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn sample_log() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("sample_app.log")
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn write_log(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn counts_levels_of_mixed_file() {
        let report = analyze(&sample_log(), None).unwrap();

        assert_eq!(report.total_lines, 10);
        assert_eq!(report.skipped_lines, 0);
        assert_eq!(report.summary.lines_processed, 10);
        assert_eq!(report.summary.error_count, 3);
        assert_eq!(report.summary.warning_count, 2);
        assert_eq!(report.summary.critical_count, 1);
        assert!(report.summary.active_alerts.is_empty());
        assert_eq!(report.summary.alert_count_by_severity.len(), 4);
    }

    #[test]
    fn ranks_error_messages() {
        let report = analyze(&sample_log(), None).unwrap();

        assert_eq!(report.unique_error_count, 2);
        assert_eq!(report.top_errors.len(), 2);
        assert_eq!(
            report.top_errors[0].message,
            "ERROR database connection error: connection refused"
        );
        assert_eq!(report.top_errors[0].count, 2);
        assert_eq!(report.top_errors[1].message, "payment declined for order 42");
        assert_eq!(report.top_errors[1].count, 1);
    }

    #[test]
    fn buckets_lines_by_hour() {
        let report = analyze(&sample_log(), None).unwrap();

        let hourly: Vec<(&str, u64)> = report
            .hourly_distribution
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(
            hourly,
            vec![
                ("2026-01-09 10:00", 5),
                ("2026-01-09 11:00", 4),
                ("2026-01-09 12:00", 1),
            ]
        );
    }

    #[test]
    fn counts_pattern_matches_without_windows() {
        let report = analyze(&sample_log(), None).unwrap();
        let matches = &report.summary.matches_by_pattern;

        assert_eq!(matches["high_error_rate"], 1);
        assert_eq!(matches["database_connection_errors"], 2);
        assert_eq!(matches["memory_pressure"], 1);
        assert_eq!(matches["authentication_failures"], 1);
        assert_eq!(matches["slow_queries"], 1);
        assert_eq!(matches["api_rate_limiting"], 0);
    }

    #[test]
    fn range_is_inclusive() {
        let range = TimeRange::new(
            Some(ts("2026-01-09T11:02:00Z")),
            Some(ts("2026-01-09T11:55:00Z")),
        );
        let report = analyze(&sample_log(), Some(range)).unwrap();

        assert_eq!(report.total_lines, 10);
        assert_eq!(report.summary.lines_processed, 4);
        assert_eq!(report.summary.error_count, 1);
        assert_eq!(report.summary.critical_count, 1);
        assert_eq!(report.hourly_distribution.len(), 1);
        assert_eq!(report.hourly_distribution["2026-01-09 11:00"], 4);
    }

    #[test]
    fn range_skips_lines_without_timestamp() {
        let file = write_log(
            b"2026-01-09 10:00:00 ERROR first\n\
              ERROR no timestamp here\n\
              {\"level\":\"error\",\"message\":\"no ts either\"}\n\
              {\"timestamp\":\"not a time\",\"level\":\"error\"}\n",
        );
        let range = TimeRange::new(Some(ts("2026-01-01T00:00:00Z")), None);
        let report = analyze(file.path(), Some(range)).unwrap();

        assert_eq!(report.total_lines, 4);
        assert_eq!(report.skipped_lines, 3);
        assert_eq!(report.summary.error_count, 1);
    }

    #[test]
    fn no_range_keeps_lines_without_timestamp() {
        let file = write_log(b"ERROR no timestamp here\nWARN also none\n");
        let report = analyze(file.path(), None).unwrap();

        assert_eq!(report.skipped_lines, 0);
        assert_eq!(report.summary.error_count, 1);
        assert_eq!(report.summary.warning_count, 1);
        assert!(report.hourly_distribution.is_empty());
    }

    #[test]
    fn tolerates_invalid_utf8_and_crlf() {
        let file = write_log(b"2026-01-09 10:00:00 ERROR bad \xff byte\r\n\r\nINFO ok");
        let report = analyze(file.path(), None).unwrap();

        assert_eq!(report.total_lines, 3);
        assert_eq!(report.summary.lines_processed, 2);
        assert_eq!(report.top_errors[0].message, "ERROR bad \u{FFFD} byte");
    }

    #[test]
    fn every_line_mentioning_error_counts_as_error() {
        let file = write_log(
            b"2026-01-09 10:00:00 ERROR one\n\
              2026-01-09 10:00:01 INFO fine\n\
              2026-01-09 10:00:02 CRITICAL ERROR two\n\
              2026-01-09 10:00:03 WARNING slow\n\
              2026-01-09 10:00:04 error three\n\
              2026-01-09 10:00:05 CRITICAL disk full\n",
        );
        let report = analyze(file.path(), None).unwrap();

        assert_eq!(report.summary.error_count, 3);
        assert_eq!(report.summary.warning_count, 1);
        assert_eq!(report.summary.critical_count, 1);
    }

    #[test]
    fn log_rate_uses_timestamp_span() {
        let file = write_log(
            b"2026-01-09 10:00:00 INFO a\n\
              2026-01-09 10:01:00 INFO b\n\
              2026-01-09 10:02:00 INFO c\n\
              2026-01-09 10:02:00 INFO d\n",
        );
        let report = analyze(file.path(), None).unwrap();
        assert!((report.summary.log_rate_per_minute - 2.0).abs() < 1e-9);

        let single = write_log(b"2026-01-09 10:00:00 INFO only\n");
        let report = analyze(single.path(), None).unwrap();
        assert_eq!(report.summary.log_rate_per_minute, 0.0);
    }

    #[test]
    fn top_errors_capped_at_ten() {
        let content: String = (0..15).map(|i| format!("ERROR failure {i}\n")).collect();
        let file = write_log(content.as_bytes());
        let report = analyze(file.path(), None).unwrap();

        assert_eq!(report.unique_error_count, 15);
        assert_eq!(report.top_errors.len(), TOP_ERRORS_LIMIT);
    }

    #[test]
    fn custom_patterns_only() {
        let analyzer = LogAnalyzer::new(vec![
            PatternSpec::regex("orders", r"order \d+", Severity::Info, 1, Duration::from_secs(60))
                .unwrap(),
        ]);
        let report = analyzer.analyze(&sample_log(), None).unwrap();

        assert_eq!(report.summary.matches_by_pattern.len(), 1);
        assert_eq!(report.summary.matches_by_pattern["orders"], 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = analyze(Path::new("/nonexistent/app.log"), None).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn report_serializes_flat() {
        let report = analyze(&sample_log(), None).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["error_count"], 3);
        assert_eq!(json["total_lines"], 10);
        assert_eq!(json["top_errors"][0]["count"], 2);
        assert!(json["elapsed"].is_string());
    }
}
