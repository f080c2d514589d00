//! Single-rule threshold alarm.
//!
//! ```text
//!             create_alarm                 breach
//!  NoAlarm ───────────────► Armed ─────────────────► Triggered
//!     ▲                      ▲  ▲                       │
//!     │   delete_alarm       │  └── next boundary ──────┤
//!     └──────────────────────┴───── create_alarm ───────┘
//! ```
//!
//! At most one rule exists; creating a rule replaces the previous one without
//! confirmation. A rule fires at most once per window boundary; acknowledging
//! silences audio but leaves the rule triggered until the boundary advances.

use crate::{
    boundary::WindowGeometry,
    clock::Clock,
    history::{TriggerEvent, TriggerHistory},
    notifier::AudioNotifier,
    threshold::{Threshold, evaluate_threshold, format_compact},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Threshold rule bound to one metric.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlarmRule {
    pub metric: String,
    pub threshold: f64,
    pub is_absolute: bool,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl AlarmRule {
    pub fn is_breached_by(&self, value: f64) -> bool {
        evaluate_threshold(value, self.threshold, self.is_absolute)
    }

    /// `100.0m (Absolute)` style description.
    pub fn describe(&self) -> String {
        if self.is_absolute {
            format!("{} (Absolute)", format_compact(self.threshold))
        } else {
            format_compact(self.threshold)
        }
    }
}

/// Debounce bookkeeping, reset on boundary advance and rule replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmRuntimeState {
    pub has_triggered_this_boundary: bool,
    pub current_boundary_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AlarmState {
    #[display("No alarm")]
    NoAlarm,
    #[display("Active")]
    Armed,
    #[display("TRIGGERED")]
    Triggered,
    #[display("Paused")]
    Paused,
}

/// Owns the rule, its runtime state, the trigger log and the audio notifier.
#[derive(Debug)]
pub struct AlarmEngine<C, N> {
    clock: C,
    geometry: WindowGeometry,
    notifier: N,
    rule: Option<AlarmRule>,
    runtime: AlarmRuntimeState,
    history: TriggerHistory,
}

impl<C, N> AlarmEngine<C, N>
where
    C: Clock,
    N: AudioNotifier,
{
    pub fn new(clock: C, geometry: WindowGeometry, notifier: N) -> Self {
        Self {
            clock,
            geometry,
            notifier,
            rule: None,
            runtime: AlarmRuntimeState::default(),
            history: TriggerHistory::new(),
        }
    }

    /// Replace any existing rule with a new armed one.
    pub fn create_alarm(
        &mut self,
        threshold: impl Into<Threshold>,
        is_absolute: bool,
        metric: impl Into<String>,
    ) -> &AlarmRule {
        let now = self.clock.now();
        let rule = AlarmRule {
            metric: metric.into(),
            threshold: threshold.into().value(),
            is_absolute,
            created_at: now,
            is_active: true,
        };

        self.runtime = AlarmRuntimeState {
            has_triggered_this_boundary: false,
            current_boundary_start: Some(self.geometry.boundary_start(now)),
        };

        info!(
            metric = %rule.metric,
            threshold = rule.threshold,
            is_absolute = rule.is_absolute,
            replaced = self.rule.is_some(),
            "alarm created"
        );

        self.rule.insert(rule)
    }

    /// Remove the rule and silence any sounding alarm.
    pub fn delete_alarm(&mut self) {
        if let Some(rule) = self.rule.take() {
            info!(metric = %rule.metric, "alarm deleted");
        }
        self.runtime = AlarmRuntimeState::default();
        self.notifier.stop_alarm();
    }

    /// Suspend or resume the current rule without losing it.
    ///
    /// Returns `false` when there is no rule.
    pub fn set_alarm_active(&mut self, active: bool) -> bool {
        match self.rule.as_mut() {
            Some(rule) => {
                rule.is_active = active;
                debug!(metric = %rule.metric, active, "alarm activity changed");
                true
            }
            None => false,
        }
    }

    /// Evaluate `current_value` of `current_metric` against the rule.
    ///
    /// Returns `true` only when this call fired the alarm.
    pub fn check_alarm(&mut self, current_value: f64, current_metric: &str) -> bool {
        let Some(rule) = self.rule.as_ref() else {
            return false;
        };
        if !rule.is_active || rule.metric != current_metric {
            return false;
        }

        let now = self.clock.now();
        let boundary = self.geometry.boundary_start(now);
        if self.runtime.current_boundary_start != Some(boundary) {
            if self.runtime.has_triggered_this_boundary {
                debug!(%boundary, "new boundary, alarm re-armed");
            }
            self.runtime = AlarmRuntimeState {
                has_triggered_this_boundary: false,
                current_boundary_start: Some(boundary),
            };
        }

        if self.runtime.has_triggered_this_boundary || !rule.is_breached_by(current_value) {
            return false;
        }

        let event = TriggerEvent {
            timestamp: now,
            value: current_value,
            threshold: rule.threshold,
            is_absolute: rule.is_absolute,
            metric: rule.metric.clone(),
        };
        info!(
            metric = %event.metric,
            value = event.value,
            threshold = event.threshold,
            is_absolute = event.is_absolute,
            "alarm triggered"
        );

        self.history.push(event);
        self.runtime.has_triggered_this_boundary = true;
        self.notifier.play_alarm();
        true
    }

    /// Silence audio. The rule stays triggered until the next boundary.
    pub fn acknowledge_alarm(&mut self) {
        self.notifier.stop_alarm();
        info!("alarm acknowledged");
    }

    pub fn current_alarm(&self) -> Option<&AlarmRule> {
        self.rule.as_ref()
    }

    pub fn runtime_state(&self) -> AlarmRuntimeState {
        self.runtime
    }

    /// State as of now: a trigger recorded in an earlier boundary reads as re-armed.
    pub fn state(&self) -> AlarmState {
        let Some(rule) = self.rule.as_ref() else {
            return AlarmState::NoAlarm;
        };
        if !rule.is_active {
            return AlarmState::Paused;
        }

        let boundary = self.geometry.boundary_start(self.clock.now());
        if self.runtime.has_triggered_this_boundary
            && self.runtime.current_boundary_start == Some(boundary)
        {
            AlarmState::Triggered
        } else {
            AlarmState::Armed
        }
    }

    pub fn trigger_history(&self) -> &TriggerHistory {
        &self.history
    }

    pub fn clear_trigger_history(&mut self) {
        self.history.clear();
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }
}
