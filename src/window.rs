//! Sliding-window occurrence counting.
//!
//! Each pattern owns an ordered deque of match timestamps. Eviction is lazy:
//! entries older than `now - window` are dropped when the window is read, so
//! no background timer is needed and a quiet pattern still reports a clean
//! window the next time it is asked.
//!
//! Windows live in memory only. A fresh process starts with empty windows.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::pattern::PatternSpec;

#[derive(Debug)]
struct Window {
    length: TimeDelta,
    occurrences: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn evict(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(self.length) else {
            return;
        };
        while self.occurrences.front().is_some_and(|ts| *ts < cutoff) {
            self.occurrences.pop_front();
        }
    }
}

/// Per-pattern sliding-window tracker.
///
/// Owned by the monitor loop, which is its only writer.
#[derive(Debug, Default)]
pub struct WindowCounter {
    windows: HashMap<String, Window>,
}

impl WindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counter with one window per pattern.
    pub fn for_patterns(patterns: &[PatternSpec]) -> Self {
        let mut counter = Self::new();
        for pattern in patterns {
            counter.register(pattern.name(), pattern.window());
        }
        counter
    }

    /// Register (or re-size) the window of a pattern.
    pub fn register(&mut self, pattern_name: &str, window: Duration) {
        let length = TimeDelta::from_std(window).unwrap_or_else(|_| TimeDelta::weeks(52 * 100));
        self.windows
            .entry(pattern_name.to_string())
            .and_modify(|w| w.length = length)
            .or_insert_with(|| Window {
                length,
                occurrences: VecDeque::new(),
            });
    }

    /// Record one occurrence. Unregistered patterns are ignored.
    pub fn record(&mut self, pattern_name: &str, timestamp: DateTime<Utc>) {
        match self.windows.get_mut(pattern_name) {
            Some(window) => window.occurrences.push_back(timestamp),
            None => tracing::debug!(pattern = %pattern_name, "Occurrence for unregistered pattern ignored"),
        }
    }

    /// Number of occurrences within the trailing window ending at `now`.
    ///
    /// Evicts expired entries first. Unregistered patterns count zero.
    pub fn count(&mut self, pattern_name: &str, now: DateTime<Utc>) -> usize {
        match self.windows.get_mut(pattern_name) {
            Some(window) => {
                window.evict(now);
                window.occurrences.len()
            }
            None => 0,
        }
    }
}
