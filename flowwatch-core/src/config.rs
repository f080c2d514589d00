//! Engine configuration.
//!
//! Defaults describe 5-minute windows of 1-minute buckets. Every field can be
//! overridden through `FLOWWATCH_*` environment variables; unparseable values
//! fall back to the default, out-of-range values are rejected by
//! [`FlowConfig::validate`].

use crate::{
    boundary::{DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_UNIT_SECS, WindowGeometry},
    chart::AxisScale,
    error::FlowError,
    notifier::TonePattern,
};
use std::str::FromStr;

/// Bucket count per window (env: FLOWWATCH_BUCKET_COUNT, default: 5)
pub const ENV_BUCKET_COUNT: &str = "FLOWWATCH_BUCKET_COUNT";
/// Bucket width in seconds (env: FLOWWATCH_BUCKET_SECS, default: 60)
pub const ENV_BUCKET_SECS: &str = "FLOWWATCH_BUCKET_SECS";
/// Metric chart y-axis increment (env: FLOWWATCH_METRIC_AXIS_STEP, default: 5,000,000)
pub const ENV_METRIC_AXIS_STEP: &str = "FLOWWATCH_METRIC_AXIS_STEP";
/// Price chart y-axis increment in percent (env: FLOWWATCH_PRICE_AXIS_STEP, default: 0.25)
pub const ENV_PRICE_AXIS_STEP: &str = "FLOWWATCH_PRICE_AXIS_STEP";
/// Alarm volume 0.0 to 1.0 (env: FLOWWATCH_ALARM_VOLUME, default: 0.3)
pub const ENV_ALARM_VOLUME: &str = "FLOWWATCH_ALARM_VOLUME";
/// Trigger history rows shown (env: FLOWWATCH_HISTORY_DISPLAY, default: 5)
pub const ENV_HISTORY_DISPLAY: &str = "FLOWWATCH_HISTORY_DISPLAY";

/// Read `key` from the environment, falling back to `default` when unset or unparseable.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Y-axis shape of one chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisConfig {
    /// Growth increment.
    pub step: f64,
    /// Initial symmetric bound around zero.
    pub initial_span: f64,
}

impl AxisConfig {
    pub fn scale(&self) -> AxisScale {
        AxisScale::new(self.step, self.initial_span)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    pub bucket_count: u32,
    pub bucket_unit_secs: i64,
    pub metric_axis: AxisConfig,
    pub price_axis: AxisConfig,
    pub tone: TonePattern,
    pub history_display: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            bucket_unit_secs: DEFAULT_BUCKET_UNIT_SECS,
            metric_axis: AxisConfig {
                step: 5_000_000.0,
                initial_span: 20_000_000.0,
            },
            price_axis: AxisConfig {
                step: 0.25,
                initial_span: 1.0,
            },
            tone: TonePattern::default(),
            history_display: 5,
        }
    }
}

impl FlowConfig {
    /// Defaults overridden by any `FLOWWATCH_*` variables, validated.
    pub fn from_env() -> Result<Self, FlowError> {
        let defaults = Self::default();
        let config = Self {
            bucket_count: env_or(ENV_BUCKET_COUNT, defaults.bucket_count),
            bucket_unit_secs: env_or(ENV_BUCKET_SECS, defaults.bucket_unit_secs),
            metric_axis: AxisConfig {
                step: env_or(ENV_METRIC_AXIS_STEP, defaults.metric_axis.step),
                ..defaults.metric_axis
            },
            price_axis: AxisConfig {
                step: env_or(ENV_PRICE_AXIS_STEP, defaults.price_axis.step),
                ..defaults.price_axis
            },
            tone: TonePattern {
                volume: env_or(ENV_ALARM_VOLUME, defaults.tone.volume),
                ..defaults.tone
            },
            history_display: env_or(ENV_HISTORY_DISPLAY, defaults.history_display),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_window(mut self, bucket_count: u32, bucket_unit_secs: i64) -> Self {
        self.bucket_count = bucket_count;
        self.bucket_unit_secs = bucket_unit_secs;
        self
    }

    pub fn with_metric_axis(mut self, step: f64, initial_span: f64) -> Self {
        self.metric_axis = AxisConfig { step, initial_span };
        self
    }

    pub fn with_price_axis(mut self, step: f64, initial_span: f64) -> Self {
        self.price_axis = AxisConfig { step, initial_span };
        self
    }

    pub fn with_tone(mut self, tone: TonePattern) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_history_display(mut self, rows: usize) -> Self {
        self.history_display = rows;
        self
    }

    pub fn geometry(&self) -> Result<WindowGeometry, FlowError> {
        WindowGeometry::new(self.bucket_count, self.bucket_unit_secs)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        self.geometry()?;

        for (name, axis) in [("metric", &self.metric_axis), ("price", &self.price_axis)] {
            if !(axis.step.is_finite() && axis.step > 0.0) {
                return Err(FlowError::Config(format!(
                    "{name} axis step must be positive, got {}",
                    axis.step
                )));
            }
            if !(axis.initial_span.is_finite() && axis.initial_span >= 0.0) {
                return Err(FlowError::Config(format!(
                    "{name} axis span must be non-negative, got {}",
                    axis.initial_span
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.tone.volume) {
            return Err(FlowError::Config(format!(
                "alarm volume must be within 0.0..=1.0, got {}",
                self.tone.volume
            )));
        }
        if self.tone.tone_ms <= 0 || self.tone.total_ms <= 0 {
            return Err(FlowError::Config(
                "alarm tone and total durations must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FlowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geometry().unwrap(), WindowGeometry::default());
        assert_eq!(config.metric_axis.scale().max(), 20_000_000.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        struct TestCase {
            input: FlowConfig,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: empty window
                input: FlowConfig::default().with_window(0, 60),
                expected: false,
            },
            TestCase {
                // TC1: zero unit
                input: FlowConfig::default().with_window(5, 0),
                expected: false,
            },
            TestCase {
                // TC2: negative axis step
                input: FlowConfig::default().with_metric_axis(-1.0, 10.0),
                expected: false,
            },
            TestCase {
                // TC3: volume out of range
                input: FlowConfig::default().with_tone(TonePattern {
                    volume: 1.5,
                    ..Default::default()
                }),
                expected: false,
            },
            TestCase {
                // TC4: bucket unit so large the window width overflows
                input: FlowConfig::default().with_window(5, i64::MAX / 2),
                expected: false,
            },
            TestCase {
                // TC5: custom but sane
                input: FlowConfig::default()
                    .with_window(4, 15)
                    .with_price_axis(0.1, 0.5)
                    .with_history_display(10),
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.validate().is_ok();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_env_or_falls_back_on_missing_key() {
        assert_eq!(env_or("FLOWWATCH_TEST_DEFINITELY_UNSET", 17u32), 17);
    }
}
