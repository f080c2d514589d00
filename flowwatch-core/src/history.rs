//! Append-only record of alarm triggers.

use crate::threshold::format_compact;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// One alarm firing. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TriggerEvent {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub threshold: f64,
    pub is_absolute: bool,
    pub metric: String,
}

impl TriggerEvent {
    /// `HH:MM:SS: 105.0m` in local time.
    pub fn summary(&self) -> String {
        format!(
            "{}: {}",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            format_compact(self.value)
        )
    }
}

/// Ordered, unbounded trigger log. Only the display layer truncates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerHistory {
    events: Vec<TriggerEvent>,
}

impl TriggerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TriggerEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Oldest first.
    pub fn events(&self) -> &[TriggerEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&TriggerEvent> {
        self.events.last()
    }

    /// Up to `limit` most recent events, newest first.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &TriggerEvent> {
        self.events.iter().rev().take(limit)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
