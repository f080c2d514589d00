//! Chart renderer seam plus an in-memory bucket chart with stepped y-axis scaling.

use crate::window::Bucket;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Which tracked series a chart update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
pub enum SeriesKind {
    #[display("metric")]
    Metric,
    #[display("price")]
    Price,
}

/// Chart output collaborator.
///
/// Receives exactly `bucket_count` points per series: the whole sequence when a
/// window is created or replaced, single points otherwise.
pub trait ChartRenderer {
    /// Forget everything drawn for `series` (tracking switched or stopped).
    fn clear(&mut self, series: SeriesKind);

    fn replace_points(&mut self, series: SeriesKind, points: &[Bucket]);

    fn update_point(&mut self, series: SeriesKind, index: usize, point: Bucket);
}

/// Y-axis bounds that only ever grow, in whole `step` increments, and always keep zero in view.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AxisScale {
    step: f64,
    initial_span: f64,
    min: f64,
    max: f64,
}

impl AxisScale {
    /// Start at `-initial_span..=initial_span`.
    pub fn new(step: f64, initial_span: f64) -> Self {
        let step = if step > 0.0 && step.is_finite() { step } else { 1.0 };
        let initial_span = initial_span.abs();

        Self {
            step,
            initial_span,
            min: -initial_span,
            max: initial_span,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Widen the bounds to include `value`. Returns `true` if they changed.
    pub fn fit(&mut self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }

        if value > self.max {
            self.max = (value / self.step).ceil() * self.step;
            true
        } else if value < self.min {
            self.min = (value / self.step).floor() * self.step;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.min = -self.initial_span;
        self.max = self.initial_span;
    }
}

/// Points and axis of one drawn series.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    points: Vec<Bucket>,
    scale: AxisScale,
}

impl ChartSeries {
    pub fn new(scale: AxisScale) -> Self {
        Self {
            points: Vec::new(),
            scale,
        }
    }

    pub fn points(&self) -> &[Bucket] {
        &self.points
    }

    pub fn scale(&self) -> &AxisScale {
        &self.scale
    }
}

/// In-memory [`ChartRenderer`] holding the latest points of both series.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketChart {
    metric: ChartSeries,
    price: ChartSeries,
}

impl BucketChart {
    pub fn new(metric_scale: AxisScale, price_scale: AxisScale) -> Self {
        Self {
            metric: ChartSeries::new(metric_scale),
            price: ChartSeries::new(price_scale),
        }
    }

    pub fn series(&self, kind: SeriesKind) -> &ChartSeries {
        match kind {
            SeriesKind::Metric => &self.metric,
            SeriesKind::Price => &self.price,
        }
    }

    fn series_mut(&mut self, kind: SeriesKind) -> &mut ChartSeries {
        match kind {
            SeriesKind::Metric => &mut self.metric,
            SeriesKind::Price => &mut self.price,
        }
    }
}

impl ChartRenderer for BucketChart {
    fn clear(&mut self, series: SeriesKind) {
        let series = self.series_mut(series);
        series.points.clear();
        series.scale.reset();
    }

    fn replace_points(&mut self, series: SeriesKind, points: &[Bucket]) {
        let series = self.series_mut(series);
        series.points = points.to_vec();
        for point in points {
            series.scale.fit(point.value);
        }
    }

    fn update_point(&mut self, series: SeriesKind, index: usize, point: Bucket) {
        let series = self.series_mut(series);
        if let Some(slot) = series.points.get_mut(index) {
            *slot = point;
            series.scale.fit(point.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_axis_scale_grows_in_steps_and_keeps_zero() {
        let mut scale = AxisScale::new(5_000_000.0, 20_000_000.0);

        assert!(!scale.fit(19_000_000.0));
        assert!(scale.fit(21_000_000.0));
        assert_eq!(scale.max(), 25_000_000.0);
        assert_eq!(scale.min(), -20_000_000.0);

        assert!(scale.fit(-31_000_000.0));
        assert_eq!(scale.min(), -35_000_000.0);

        // Never shrinks on smaller values
        assert!(!scale.fit(1.0));
        assert_eq!(scale.max(), 25_000_000.0);
        assert!(scale.min() <= 0.0 && scale.max() >= 0.0);

        scale.reset();
        assert_eq!((scale.min(), scale.max()), (-20_000_000.0, 20_000_000.0));
    }

    #[test]
    fn test_axis_scale_ignores_non_finite_and_bad_step() {
        let mut scale = AxisScale::new(0.0, 1.0);
        assert_eq!(scale.step(), 1.0);
        assert!(!scale.fit(f64::NAN));
        assert!(scale.fit(2.5));
        assert_eq!(scale.max(), 3.0);
    }

    #[test]
    fn test_bucket_chart_replace_update_clear() {
        let mut chart = BucketChart::new(AxisScale::new(5.0, 10.0), AxisScale::new(0.25, 1.0));
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 9, 35, 0).unwrap();
        let points = vec![Bucket { time, value: 0.0 }; 5];

        chart.replace_points(SeriesKind::Metric, &points);
        chart.update_point(SeriesKind::Metric, 2, Bucket { time, value: 12.0 });
        // Out of range updates are ignored
        chart.update_point(SeriesKind::Metric, 9, Bucket { time, value: 99.0 });

        let metric = chart.series(SeriesKind::Metric);
        assert_eq!(metric.points().len(), 5);
        assert_eq!(metric.points()[2].value, 12.0);
        assert_eq!(metric.scale().max(), 15.0);
        assert!(chart.series(SeriesKind::Price).points().is_empty());

        chart.clear(SeriesKind::Metric);
        assert!(chart.series(SeriesKind::Metric).points().is_empty());
        assert_eq!(chart.series(SeriesKind::Metric).scale().max(), 10.0);
    }
}
