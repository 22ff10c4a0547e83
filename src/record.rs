//! A single log line, viewed either as raw text or as a structured record.
//!
//! Monitored files may be plain text or JSON lines. Every line is parsed at
//! most once into a [`LogRecord`]; matchers, level detection and the batch
//! analyzer all read from it:
//!
//! ```json
//! {"timestamp":"2026-01-09T10:00:00Z","level":"ERROR","message":"connection refused"}
//! ```
//!
//! ```text
//! 2026-01-09 10:00:00 ERROR connection refused
//! ```

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::pattern::Severity;

/// Field names consulted, in order, for the level of a structured record.
const LEVEL_FIELDS: &[&str] = &["level", "severity", "lvl"];

/// Field names consulted, in order, for the message of a structured record.
const MESSAGE_FIELDS: &[&str] = &["message", "msg", "_msg"];

/// Field names consulted, in order, for the timestamp of a structured record.
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "time", "@timestamp", "ts", "_time"];

/// Naive timestamp layouts accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One log line plus its parsed fields when the line is a JSON object.
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    raw: &'a str,
    fields: Option<Map<String, Value>>,
}

impl<'a> LogRecord<'a> {
    /// Parse a raw line. Lines that are not JSON objects stay text-only.
    pub fn parse(raw: &'a str) -> Self {
        let fields = if raw.trim_start().starts_with('{') {
            serde_json::from_str::<Map<String, Value>>(raw).ok()
        } else {
            None
        };
        Self { raw, fields }
    }

    /// The line exactly as read from the file (without terminator).
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// Parsed fields, if the line was a JSON object.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.fields.as_ref()
    }

    pub fn is_structured(&self) -> bool {
        self.fields.is_some()
    }

    /// Look up a field by dot-notation path (`http.status`).
    ///
    /// Always `None` for text lines.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let fields = self.fields.as_ref()?;
        let mut segments = path.split('.');
        let first = fields.get(segments.next()?)?;
        segments.try_fold(first, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// A field rendered as text: strings as-is, scalars via their JSON form.
    pub fn field_text(&self, path: &str) -> Option<Cow<'_, str>> {
        match self.field(path)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Null => None,
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Log level of the line, if one can be determined.
    ///
    /// Structured records use their `level` field. Text lines are scanned for
    /// keywords in a fixed order: ERROR, then WARN, then CRITICAL or FATAL,
    /// then INFO. Any line mentioning ERROR counts as an error.
    pub fn level(&self) -> Option<Severity> {
        if self.is_structured() {
            return LEVEL_FIELDS
                .iter()
                .find_map(|name| self.field_text(name))
                .and_then(|level| Severity::from_level_name(&level));
        }

        let upper = self.raw.to_uppercase();
        if upper.contains("ERROR") {
            Some(Severity::Error)
        } else if upper.contains("WARN") {
            Some(Severity::Warning)
        } else if upper.contains("CRITICAL") || upper.contains("FATAL") {
            Some(Severity::Critical)
        } else if upper.contains("INFO") {
            Some(Severity::Info)
        } else {
            None
        }
    }

    /// Human-readable message of the line.
    ///
    /// Structured records use their `message` field and fall back to the raw
    /// line. Text lines drop a leading timestamp.
    pub fn message(&self) -> Cow<'_, str> {
        if self.is_structured() {
            return MESSAGE_FIELDS
                .iter()
                .find_map(|name| self.field_text(name))
                .unwrap_or(Cow::Borrowed(self.raw.trim()));
        }

        match split_text_timestamp(self.raw) {
            Some((_, rest)) => Cow::Borrowed(rest),
            None => Cow::Borrowed(self.raw.trim()),
        }
    }

    /// Timestamp carried by the line itself.
    ///
    /// # Errors
    ///
    /// - `ParseError::MissingTimestamp` if no timestamp is present
    /// - `ParseError::InvalidTimestamp` if a timestamp field exists but cannot be parsed
    pub fn timestamp(&self) -> Result<DateTime<Utc>, ParseError> {
        if self.is_structured() {
            let value = TIMESTAMP_FIELDS
                .iter()
                .find_map(|name| self.field(name))
                .ok_or(ParseError::MissingTimestamp)?;
            return parse_timestamp_value(value);
        }

        split_text_timestamp(self.raw)
            .map(|(ts, _)| ts)
            .ok_or(ParseError::MissingTimestamp)
    }
}

fn parse_timestamp_value(value: &Value) -> Result<DateTime<Utc>, ParseError> {
    match value {
        Value::String(s) => {
            parse_timestamp_str(s).ok_or_else(|| ParseError::InvalidTimestamp(s.clone()))
        }
        Value::Number(n) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| ParseError::InvalidTimestamp(n.to_string()))?;
            // Values this large are epoch milliseconds.
            let millis = if secs > 1e12 { secs } else { secs * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .ok_or_else(|| ParseError::InvalidTimestamp(n.to_string()))
        }
        other => Err(ParseError::InvalidTimestamp(other.to_string())),
    }
}

/// Parse an RFC 3339 or naive (UTC) timestamp string.
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Split a leading timestamp off a text line.
///
/// Accepts `2026-01-09T10:00:00Z rest`, `2026-01-09 10:00:00,123 rest` and the
/// same forms wrapped in square brackets.
fn split_text_timestamp(raw: &str) -> Option<(DateTime<Utc>, &str)> {
    let line = raw.trim_start();
    let (candidate, offset) = match line.strip_prefix('[') {
        Some(inner) => {
            let end = inner.find(']')?;
            (&inner[..end], end + 2)
        }
        None => {
            // A date and a time separated by one space, or a single token.
            let mut tokens = line.splitn(3, ' ');
            let first = tokens.next()?;
            match tokens.next() {
                Some(second) if parse_timestamp_str(first).is_none() => {
                    let joined_len = first.len() + 1 + second.len();
                    (&line[..joined_len], joined_len)
                }
                _ => (first, first.len()),
            }
        }
    };

    let normalized = candidate.replace(',', ".");
    let ts = parse_timestamp_str(&normalized)?;
    Some((ts, line[offset.min(line.len())..].trim()))
}
