//! Scraped snapshots and the deltas derived from consecutive snapshots.

use crate::threshold::parse_leading_float;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Labels published by the sentiment page, in page order.
pub const TRACKED_METRICS: [&str; 21] = [
    "SmartFlow",
    "MomoFlow",
    "SmartTally",
    "MomoTally",
    "Net Call Flow",
    "Net Put Flow",
    "Net Call Prem",
    "Net Put Prem",
    "NOFA",
    "Call Wall All",
    "Put Wall All",
    "Zero Gamma Flip All",
    "Gamma Gravity All",
    "Call Wall 7",
    "Put Wall 7",
    "Zero Gamma Flip 7",
    "Gamma Gravity 7",
    "Call Wall 0",
    "Put Wall 0",
    "Zero Gamma Flip 0",
    "Gamma Gravity 0",
];

pub fn is_tracked_metric(metric: &str) -> bool {
    TRACKED_METRICS.contains(&metric)
}

/// Metric name to raw display string, e.g. `"SmartFlow" -> "12,345,678"`.
pub type Snapshot = IndexMap<String, String>;

/// Numeric value of a scraped string: thousands separators stripped, leading
/// float parsed, anything else `0.0`.
pub fn normalize_value(raw: &str) -> f64 {
    let stripped = raw.replace(',', "");
    parse_leading_float(stripped.trim()).unwrap_or(0.0)
}

/// Raw observed value, either scraped text or an already numeric sample.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn to_f64(&self) -> f64 {
        match self {
            RawValue::Number(value) if value.is_finite() => *value,
            RawValue::Number(_) => 0.0,
            RawValue::Text(text) => normalize_value(text),
        }
    }
}

/// Metric label of price observations.
pub const PRICE_METRIC: &str = "price";

/// Single scrape result.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Observation {
    pub metric: String,
    pub raw_value: RawValue,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(metric: impl Into<String>, raw_value: RawValue, observed_at: DateTime<Utc>) -> Self {
        Self {
            metric: metric.into(),
            raw_value,
            observed_at,
        }
    }

    pub fn price(raw_value: RawValue, observed_at: DateTime<Utc>) -> Self {
        Self::new(PRICE_METRIC, raw_value, observed_at)
    }

    /// Normalised numeric value, 0 when unreadable.
    pub fn value(&self) -> f64 {
        self.raw_value.to_f64()
    }
}

/// Raw before/after strings of one changed metric. `from` is absent for a
/// metric that was not in the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
}

/// Numeric change of one metric between two snapshots.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeltaEvent {
    pub metric: String,
    pub from: f64,
    pub to: f64,
    pub delta: f64,
}

impl DeltaEvent {
    pub fn from_change(metric: impl Into<String>, change: &ValueChange) -> Self {
        let from = change.from.as_deref().map(normalize_value).unwrap_or(0.0);
        let to = normalize_value(&change.to);

        Self {
            metric: metric.into(),
            from,
            to,
            delta: to - from,
        }
    }
}

/// Diffs each snapshot against the previous one.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiffer {
    previous: Option<Snapshot>,
}

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    /// Changed metrics of `next` relative to the previous snapshot.
    ///
    /// The first snapshot only establishes the baseline and yields no changes.
    pub fn diff(&mut self, next: &Snapshot) -> IndexMap<String, ValueChange> {
        let Some(previous) = self.previous.as_ref() else {
            self.previous = Some(next.clone());
            return IndexMap::new();
        };

        let changes: IndexMap<String, ValueChange> = next
            .iter()
            .filter(|(metric, value)| previous.get(*metric) != Some(*value))
            .map(|(metric, value)| {
                (
                    metric.clone(),
                    ValueChange {
                        from: previous.get(metric).cloned(),
                        to: value.clone(),
                    },
                )
            })
            .collect();

        if !changes.is_empty() {
            self.previous = Some(next.clone());
        }
        changes
    }
}
