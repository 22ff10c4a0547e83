//! Alert lifecycle registry.
//!
//! The store is the single owner of alert state. The monitor loop creates and
//! updates alerts; any other task may query, acknowledge or resolve them.
//! Callers always receive clones, never references into the map.
//!
//! ```text
//!   upsert (count >= threshold)        acknowledge            resolve
//!  ─────────────────────────────▶ TRIGGERED ───────▶ ACKNOWLEDGED ───────▶ RESOLVED
//!                                     │                                      ▲
//!                                     └──── resolve / downgrade_if_clear ────┘
//! ```
//!
//! At most one non-resolved alert exists per pattern at any time.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;
use crate::pattern::{PatternSpec, Severity};

/// Maximum number of resolved alerts kept for history queries.
pub const MAX_RESOLVED_HISTORY: usize = 1000;

/// Maximum length of the sample line stored with an alert.
const MAX_SAMPLE_CHARS: usize = 500;

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertState {
    Triggered,
    Acknowledged,
    Resolved,
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertState::Resolved)
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertState::Triggered => "TRIGGERED",
            AlertState::Acknowledged => "ACKNOWLEDGED",
            AlertState::Resolved => "RESOLVED",
        })
    }
}

/// A pattern's threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub pattern_name: String,
    pub severity: Severity,
    pub message: String,
    /// Occurrences in the window at the most recent update.
    pub count: u32,
    pub threshold: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// First matching line, truncated.
    pub sample: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub state: AlertState,
}

/// Outcome of [`AlertStore::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// No active alert existed; a new TRIGGERED alert was created.
    Created(Alert),
    /// An active alert existed; its count and last_seen were refreshed.
    Updated(Alert),
}

impl Upsert {
    pub fn alert(&self) -> &Alert {
        match self {
            Upsert::Created(alert) | Upsert::Updated(alert) => alert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

#[derive(Debug)]
struct Entry {
    alert: Alert,
    /// Creation order, breaks `first_seen` ties.
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    alerts: HashMap<String, Entry>,
    /// pattern name -> id of its active alert
    active_by_pattern: HashMap<String, String>,
    /// ids of resolved alerts, oldest first
    resolved: VecDeque<String>,
    next_seq: u64,
}

impl Inner {
    fn mark_resolved(&mut self, id: &str) {
        let Some(entry) = self.alerts.get_mut(id) else {
            return;
        };
        entry.alert.state = AlertState::Resolved;
        if self
            .active_by_pattern
            .get(&entry.alert.pattern_name)
            .is_some_and(|active| active == id)
        {
            self.active_by_pattern.remove(&entry.alert.pattern_name);
        }
        self.resolved.push_back(id.to_string());

        while self.resolved.len() > MAX_RESOLVED_HISTORY {
            if let Some(oldest) = self.resolved.pop_front() {
                self.alerts.remove(&oldest);
            }
        }
    }
}

/// Thread-safe alert registry.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct AlertStore {
    inner: Arc<RwLock<Inner>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated: every
    // mutation completes before any call that could unwind.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or refresh the active alert of a pattern.
    ///
    /// Creation sets `first_seen = last_seen = timestamp` and state TRIGGERED.
    /// A refresh updates `count` and `last_seen` and never changes state.
    pub fn upsert(
        &self,
        pattern: &PatternSpec,
        count: u32,
        timestamp: DateTime<Utc>,
        sample: &str,
    ) -> Upsert {
        let mut inner = self.write();

        if let Some(id) = inner.active_by_pattern.get(pattern.name()).cloned()
            && let Some(entry) = inner.alerts.get_mut(&id)
        {
            entry.alert.count = count;
            if timestamp > entry.alert.last_seen {
                entry.alert.last_seen = timestamp;
            }
            return Upsert::Updated(entry.alert.clone());
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            pattern_name: pattern.name().to_string(),
            severity: pattern.severity(),
            message: format!(
                "Pattern '{}' matched {} times within {}",
                pattern.name(),
                count,
                format_window(pattern.window())
            ),
            count,
            threshold: pattern.threshold(),
            window: pattern.window(),
            sample: truncate_sample(sample),
            first_seen: timestamp,
            last_seen: timestamp,
            state: AlertState::Triggered,
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .active_by_pattern
            .insert(alert.pattern_name.clone(), alert.id.clone());
        inner.alerts.insert(
            alert.id.clone(),
            Entry {
                alert: alert.clone(),
                seq,
            },
        );

        Upsert::Created(alert)
    }

    /// Resolve the pattern's active alert if its window dropped below threshold.
    ///
    /// Returns the resolved alert, if any. This is the only transition the
    /// store performs on its own.
    pub fn downgrade_if_clear(&self, pattern_name: &str, current_count: u32) -> Option<Alert> {
        let mut inner = self.write();
        let id = inner.active_by_pattern.get(pattern_name)?.clone();
        let entry = inner.alerts.get(&id)?;
        if current_count >= entry.alert.threshold {
            return None;
        }
        inner.mark_resolved(&id);
        inner.alerts.get(&id).map(|e| e.alert.clone())
    }

    /// TRIGGERED -> ACKNOWLEDGED. Acknowledging twice is a no-op.
    ///
    /// # Errors
    ///
    /// `StateError` if the alert is unknown or already resolved.
    pub fn acknowledge(&self, alert_id: &str) -> Result<Alert, StateError> {
        let mut inner = self.write();
        let entry = inner
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| StateError::NotFound(alert_id.to_string()))?;

        match entry.alert.state {
            AlertState::Resolved => Err(StateError::InvalidTransition {
                id: alert_id.to_string(),
                from: AlertState::Resolved,
                to: AlertState::Acknowledged,
            }),
            AlertState::Triggered | AlertState::Acknowledged => {
                entry.alert.state = AlertState::Acknowledged;
                Ok(entry.alert.clone())
            }
        }
    }

    /// TRIGGERED or ACKNOWLEDGED -> RESOLVED.
    ///
    /// # Errors
    ///
    /// `StateError` if the alert is unknown or already resolved.
    pub fn resolve(&self, alert_id: &str) -> Result<Alert, StateError> {
        let mut inner = self.write();
        let state = inner
            .alerts
            .get(alert_id)
            .map(|entry| entry.alert.state)
            .ok_or_else(|| StateError::NotFound(alert_id.to_string()))?;

        if state == AlertState::Resolved {
            return Err(StateError::InvalidTransition {
                id: alert_id.to_string(),
                from: AlertState::Resolved,
                to: AlertState::Resolved,
            });
        }

        inner.mark_resolved(alert_id);
        inner
            .alerts
            .get(alert_id)
            .map(|entry| entry.alert.clone())
            .ok_or_else(|| StateError::NotFound(alert_id.to_string()))
    }

    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        self.read().alerts.get(alert_id).map(|e| e.alert.clone())
    }

    /// All non-resolved alerts, oldest `first_seen` first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let inner = self.read();
        let mut active: Vec<&Entry> = inner
            .alerts
            .values()
            .filter(|e| e.alert.state.is_active())
            .collect();
        active.sort_by_key(|e| (e.alert.first_seen, e.seq));
        active.into_iter().map(|e| e.alert.clone()).collect()
    }

    /// Every retained alert, newest first.
    pub fn history(&self) -> Vec<Alert> {
        let inner = self.read();
        let mut all: Vec<&Entry> = inner.alerts.values().collect();
        all.sort_by_key(|e| std::cmp::Reverse(e.seq));
        all.into_iter().map(|e| e.alert.clone()).collect()
    }

    /// Active alert count per severity. Every severity is present.
    pub fn active_count_by_severity(&self) -> HashMap<Severity, usize> {
        let mut counts: HashMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for entry in self.read().alerts.values() {
            if entry.alert.state.is_active() {
                *counts.entry(entry.alert.severity).or_default() += 1;
            }
        }
        counts
    }

    pub fn active_count(&self) -> usize {
        self.read().active_by_pattern.len()
    }
}

fn truncate_sample(sample: &str) -> String {
    match sample.char_indices().nth(MAX_SAMPLE_CHARS) {
        Some((idx, _)) => sample[..idx].to_string(),
        None => sample.to_string(),
    }
}

/// Render a window as `90s`, `5m` or `2h`.
pub fn format_window(window: Duration) -> String {
    let secs = window.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", window.as_millis())
    }
}
