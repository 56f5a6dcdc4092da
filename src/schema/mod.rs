//! Data model for PulseVault
//!
//! Defines the immutable metric identity (name + sorted label set), the
//! fixed-shape sample, half-open time ranges, and query-time label matchers.
//! Identities are validated at the ingestion boundary so dynamic shapes
//! never reach the store.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Microsecond-resolution wall-clock timestamp.
pub type TimestampMicros = i64;

/// A single time-stamped measurement belonging to exactly one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: TimestampMicros,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: TimestampMicros, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A single label key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Immutable metric identity: name plus a sorted set of labels.
///
/// Equality and hashing are by content; the label vector is sorted by key
/// at construction so two identities built from the same pairs in any
/// order compare equal. This is the index key for series resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricIdentity {
    name: String,
    labels: Vec<Label>,
}

impl MetricIdentity {
    /// Build a validated identity. Rejects empty names, empty label keys,
    /// and duplicate label keys.
    pub fn new(name: impl Into<String>, labels: Vec<Label>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Validation("metric name cannot be empty".to_string()));
        }

        let mut labels = labels;
        labels.sort();
        for pair in labels.windows(2) {
            if pair[0].key == pair[1].key {
                return Err(Error::Validation(format!(
                    "duplicate label key '{}'",
                    pair[0].key
                )));
            }
        }
        if labels.iter().any(|l| l.key.is_empty()) {
            return Err(Error::Validation("label key cannot be empty".to_string()));
        }

        Ok(Self { name, labels })
    }

    /// Identity with no labels.
    pub fn bare(name: impl Into<String>) -> Result<Self> {
        Self::new(name, Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels in sorted key order.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Value of a label by key, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|l| l.key.as_str().cmp(key))
            .ok()
            .map(|i| self.labels[i].value.as_str())
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}=\"{}\"", label.key, label.value)?;
        }
        write!(f, "}}")
    }
}

/// Query-time label matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelMatcher {
    /// Label is present with exactly this value
    Eq { key: String, value: String },
    /// Label is present with any value
    Present { key: String },
}

impl LabelMatcher {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn present(key: impl Into<String>) -> Self {
        Self::Present { key: key.into() }
    }

    pub fn matches(&self, identity: &MetricIdentity) -> bool {
        match self {
            LabelMatcher::Eq { key, value } => identity.label(key) == Some(value.as_str()),
            LabelMatcher::Present { key } => identity.label(key).is_some(),
        }
    }
}

/// Half-open time range `[start, end)` in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: TimestampMicros,
    pub end: TimestampMicros,
}

impl TimeRange {
    pub fn new(start: TimestampMicros, end: TimestampMicros) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: TimestampMicros) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Whether `[min, max]` (inclusive sample bounds) intersects this range.
    pub fn overlaps_closed(&self, min: TimestampMicros, max: TimestampMicros) -> bool {
        min < self.end && max >= self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl From<std::ops::Range<i64>> for TimeRange {
    fn from(range: std::ops::Range<i64>) -> Self {
        Self::new(range.start, range.end)
    }
}
