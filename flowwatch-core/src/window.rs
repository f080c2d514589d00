//! Rolling fixed-size windows of per-unit buckets.
//!
//! A [`SeriesAggregator`] owns exactly one current [`Window`] and replaces it
//! wholesale once samples reach the window end. How a sample lands in its bucket
//! is decided by the series' [`FoldPolicy`]:
//! - [`Additive`]: running sum of deltas within the current bucket unit
//!   (sentiment metrics).
//! - [`PercentChange`]: move relative to the first price seen in each bucket
//!   (price series).

use crate::boundary::WindowGeometry;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// One chart point: bucket start time and its aggregated value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bucket {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// `bucket_count` consecutive buckets starting at `start_time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    start_time: DateTime<Utc>,
    geometry: WindowGeometry,
    buckets: Vec<Bucket>,
}

impl Window {
    /// Build a window with every bucket at the neutral value `0.0`.
    pub fn new(start_time: DateTime<Utc>, geometry: WindowGeometry) -> Self {
        let buckets = (0..geometry.bucket_count() as usize)
            .map(|index| Bucket {
                time: geometry.bucket_time(start_time, index),
                value: 0.0,
            })
            .collect();

        Self {
            start_time,
            geometry,
            buckets,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// First instant no longer covered by this window.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.geometry.window_end(self.start_time)
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start_time && t < self.end_time()
    }

    /// Display range `HH:MM - HH:MM`, inclusive of the last second of the window.
    pub fn label_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let last_second = self.end_time() - chrono::Duration::seconds(1);
        format!(
            "{} - {}",
            self.start_time.with_timezone(tz).format("%H:%M"),
            last_second.with_timezone(tz).format("%H:%M")
        )
    }

    fn set_value(&mut self, index: usize, value: f64) {
        if let Some(bucket) = self.buckets.get_mut(index) {
            bucket.value = value;
        }
    }
}

/// Rule by which a new sample updates its bucket.
pub trait FoldPolicy {
    /// Clear all per-window state.
    fn reset(&mut self);

    /// Fold `sample` observed at `t` into bucket `index` and return the bucket's new value.
    fn fold(&mut self, geometry: &WindowGeometry, t: DateTime<Utc>, index: usize, sample: f64) -> f64;

    /// Value of the in-progress bucket.
    fn current(&self) -> f64;
}

/// Running sum of deltas, restarted at the first sample of every bucket unit.
#[derive(Debug, Clone, Default)]
pub struct Additive {
    accumulator: f64,
    unit: Option<i64>,
}

impl FoldPolicy for Additive {
    fn reset(&mut self) {
        self.accumulator = 0.0;
        self.unit = None;
    }

    fn fold(&mut self, geometry: &WindowGeometry, t: DateTime<Utc>, _: usize, sample: f64) -> f64 {
        let unit = geometry.unit_number(t);
        if self.unit == Some(unit) {
            self.accumulator += sample;
        } else {
            self.unit = Some(unit);
            self.accumulator = sample;
        }
        self.accumulator
    }

    fn current(&self) -> f64 {
        self.accumulator
    }
}

/// Percentage move from the first usable sample seen in each bucket.
///
/// Bases are keyed by bucket index for the lifetime of one window, so every
/// bucket shows the move within its own unit rather than drift from window start.
#[derive(Debug, Clone, Default)]
pub struct PercentChange {
    bases: Vec<Option<f64>>,
    current: f64,
}

impl PercentChange {
    /// Base recorded for bucket `index` in the current window.
    pub fn base(&self, index: usize) -> Option<f64> {
        self.bases.get(index).copied().flatten()
    }
}

/// `(sample - base) / base * 100`, or no change when the base is unusable or
/// the move overflows.
pub fn percent_change(base: Option<f64>, sample: f64) -> f64 {
    let change = match base {
        Some(base) if base != 0.0 && base.is_finite() => (sample - base) / base * 100.0,
        _ => return 0.0,
    };

    if change.is_finite() { change } else { 0.0 }
}

impl FoldPolicy for PercentChange {
    fn reset(&mut self) {
        self.bases.clear();
        self.current = 0.0;
    }

    fn fold(&mut self, _: &WindowGeometry, _: DateTime<Utc>, index: usize, sample: f64) -> f64 {
        if self.bases.len() <= index {
            self.bases.resize(index + 1, None);
        }

        // A zero price can never serve as a base
        if self.bases[index].is_none() && sample != 0.0 {
            self.bases[index] = Some(sample);
        }

        self.current = percent_change(self.bases[index], sample);
        self.current
    }

    fn current(&self) -> f64 {
        self.current
    }
}

/// Result of folding one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldOutcome {
    /// Bucket the sample landed in.
    pub index: usize,
    /// New value of that bucket.
    pub value: f64,
    /// The window was created or replaced before folding.
    pub window_replaced: bool,
}

/// One tracked series: the current window plus its fold policy state.
#[derive(Debug, Clone)]
pub struct SeriesAggregator<P> {
    geometry: WindowGeometry,
    window: Option<Window>,
    policy: P,
}

/// Summed-delta series for the selected sentiment metric.
pub type MetricSeries = SeriesAggregator<Additive>;

/// Per-bucket percentage-change series for the price.
pub type PriceSeries = SeriesAggregator<PercentChange>;

impl SeriesAggregator<Additive> {
    pub fn additive(geometry: WindowGeometry) -> Self {
        Self::new(geometry, Additive::default())
    }
}

impl SeriesAggregator<PercentChange> {
    pub fn percent_change(geometry: WindowGeometry) -> Self {
        Self::new(geometry, PercentChange::default())
    }
}

impl<P> SeriesAggregator<P>
where
    P: FoldPolicy,
{
    pub fn new(geometry: WindowGeometry, policy: P) -> Self {
        Self {
            geometry,
            window: None,
            policy,
        }
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref()
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Value the alarm engine evaluates: the in-progress bucket's accumulator.
    pub fn current_value(&self) -> f64 {
        self.policy.current()
    }

    /// Drop the window and all accumulated state.
    pub fn reset(&mut self) {
        self.window = None;
        self.policy.reset();
    }

    /// Replace the current window with an empty one enclosing `t`.
    pub fn start_window(&mut self, t: DateTime<Utc>) -> &Window {
        self.policy.reset();
        self.window.insert(Window::new(self.geometry.boundary_start(t), self.geometry))
    }

    /// Fold `contribution` observed at `t`.
    ///
    /// Returns `None` when the sample is dropped: non-finite values, or samples
    /// older than the current window start.
    pub fn on_sample(&mut self, t: DateTime<Utc>, contribution: f64) -> Option<FoldOutcome> {
        if !contribution.is_finite() {
            debug!(%t, contribution, "dropping non-finite sample");
            return None;
        }

        let mut window_replaced = false;
        match &self.window {
            None => {
                self.start_window(t);
                window_replaced = true;
            }
            Some(window) if t >= window.end_time() => {
                debug!(
                    previous_start = %window.start_time(),
                    new_start = %self.geometry.boundary_start(t),
                    "window rollover"
                );
                self.start_window(t);
                window_replaced = true;
            }
            Some(window) if t < window.start_time() => {
                warn!(
                    %t,
                    window_start = %window.start_time(),
                    "dropping sample older than the current window"
                );
                return None;
            }
            Some(_) => {}
        }

        let window = self.window.as_mut()?;
        let index = self.geometry.bucket_index(t, window.start_time());
        let value = self.policy.fold(&self.geometry, t, index, contribution);
        window.set_value(index, value);

        Some(FoldOutcome {
            index,
            value,
            window_replaced,
        })
    }
}
