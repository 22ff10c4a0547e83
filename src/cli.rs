//! Command-line interface for tailwatch using clap.

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::analyzer::TimeRange;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::record::parse_timestamp_str;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text (default).
    #[default]
    Text,
    /// Structured JSON for log aggregation.
    Json,
}

/// Watch a log file and alert when patterns cross their thresholds.
#[derive(Parser, Debug)]
#[command(name = "tailwatch")]
#[command(version)]
#[command(about = "Watch a log file and alert when patterns cross their thresholds")]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Validate configuration and exit.
    #[arg(long = "validate", conflicts_with = "analyze")]
    pub validate: bool,

    /// Analyze a complete log file, print a JSON report and exit.
    #[arg(long = "analyze", value_name = "FILE")]
    pub analyze: Option<PathBuf>,

    /// Only analyze lines at or after this time (RFC 3339 or `YYYY-MM-DD HH:MM:SS`).
    #[arg(long = "from", requires = "analyze", value_parser = parse_time)]
    pub from: Option<DateTime<Utc>>,

    /// Only analyze lines at or before this time.
    #[arg(long = "to", requires = "analyze", value_parser = parse_time)]
    pub to: Option<DateTime<Utc>>,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Range given by `--from`/`--to`, if either is set.
    pub fn time_range(&self) -> Option<TimeRange> {
        (self.from.is_some() || self.to.is_some()).then(|| TimeRange::new(self.from, self.to))
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp_str(s).ok_or_else(|| format!("invalid timestamp '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serial_test::serial;

    #[test]
    fn cli_default_config_path() {
        let cli = Cli::try_parse_from(["tailwatch"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.analyze.is_none());
        assert!(cli.time_range().is_none());
    }

    #[test]
    fn cli_custom_config_path() {
        let cli = Cli::try_parse_from(["tailwatch", "-c", "/custom/path.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/custom/path.yaml"));

        let cli = Cli::try_parse_from(["tailwatch", "--config", "/long/path.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/long/path.yaml"));
    }

    #[test]
    fn cli_validate_flag() {
        let cli = Cli::try_parse_from(["tailwatch", "--validate"]).unwrap();
        assert!(cli.validate);
    }

    #[test]
    fn cli_analyze_with_range() {
        let cli = Cli::try_parse_from([
            "tailwatch",
            "--analyze",
            "/var/log/app.log",
            "--from",
            "2026-01-09T10:00:00Z",
            "--to",
            "2026-01-09 12:00:00",
        ])
        .unwrap();

        assert_eq!(cli.analyze, Some(PathBuf::from("/var/log/app.log")));
        let range = cli.time_range().unwrap();
        assert_eq!(range.from, Some(Utc.with_ymd_and_hms(2026, 1, 9, 10, 0, 0).unwrap()));
        assert_eq!(range.to, Some(Utc.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap()));
    }

    #[test]
    fn cli_range_requires_analyze() {
        assert!(Cli::try_parse_from(["tailwatch", "--from", "2026-01-09T10:00:00Z"]).is_err());
    }

    #[test]
    fn cli_invalid_time_rejected() {
        let result = Cli::try_parse_from(["tailwatch", "--analyze", "a.log", "--to", "yesterday"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_validate_conflicts_with_analyze() {
        assert!(Cli::try_parse_from(["tailwatch", "--validate", "--analyze", "a.log"]).is_err());
    }

    #[test]
    fn cli_log_format_json() {
        let cli = Cli::try_parse_from(["tailwatch", "--log-format", "json"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(Cli::try_parse_from(["tailwatch", "--log-format", "invalid"]).is_err());
    }

    #[test]
    #[serial]
    fn cli_log_format_from_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["tailwatch"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Json));
        });
    }

    #[test]
    #[serial]
    fn cli_log_format_flag_overrides_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["tailwatch", "--log-format", "text"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Text));
        });
    }
}
