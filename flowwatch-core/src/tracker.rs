//! Application root: owns both series, the alarm engine and the chart renderer,
//! and runs each incoming record through fold, alarm check and chart update
//! before the next one is accepted.

use crate::{
    alarm::{AlarmEngine, AlarmRule},
    boundary::WindowGeometry,
    channel::ChannelRecord,
    chart::{ChartRenderer, SeriesKind},
    clock::Clock,
    error::FlowError,
    notifier::AudioNotifier,
    snapshot::{DeltaEvent, ValueChange, is_tracked_metric},
    threshold::Threshold,
    window::{FoldOutcome, FoldPolicy, MetricSeries, PriceSeries, SeriesAggregator},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info};

/// Result of one selected-metric delta.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    pub delta: DeltaEvent,
    pub fold: FoldOutcome,
    /// The alarm fired on this delta.
    pub triggered: bool,
}

/// Result of one channel record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Metric(TrackOutcome),
    Price(FoldOutcome),
    /// Nothing tracked changed, or the sample was dropped.
    Ignored,
}

#[derive(Debug)]
pub struct Tracker<C, N, R> {
    clock: C,
    selected_metric: Option<String>,
    metric_series: MetricSeries,
    price_series: PriceSeries,
    alarm: AlarmEngine<C, N>,
    renderer: R,
    last_price: Option<f64>,
}

impl<C, N, R> Tracker<C, N, R>
where
    C: Clock + Clone,
    N: AudioNotifier,
    R: ChartRenderer,
{
    pub fn new(clock: C, geometry: WindowGeometry, notifier: N, renderer: R) -> Self {
        Self {
            alarm: AlarmEngine::new(clock.clone(), geometry, notifier),
            clock,
            selected_metric: None,
            metric_series: MetricSeries::additive(geometry),
            price_series: PriceSeries::percent_change(geometry),
            renderer,
            last_price: None,
        }
    }

    /// Start tracking `metric` from an empty window, discarding the previous series.
    pub fn select_metric(&mut self, metric: &str) -> Result<(), FlowError> {
        if !is_tracked_metric(metric) {
            return Err(FlowError::UnknownMetric(metric.to_string()));
        }

        info!(metric, previous = ?self.selected_metric, "tracking metric");
        self.selected_metric = Some(metric.to_string());
        self.metric_series.reset();
        let window = self.metric_series.start_window(self.clock.now());

        self.renderer.clear(SeriesKind::Metric);
        self.renderer.replace_points(SeriesKind::Metric, window.buckets());
        Ok(())
    }

    /// Stop tracking the selected metric. The alarm rule, if any, is kept.
    pub fn stop_tracking(&mut self) {
        if let Some(metric) = self.selected_metric.take() {
            info!(%metric, "stopped tracking metric");
        }
        self.metric_series.reset();
        self.renderer.clear(SeriesKind::Metric);
    }

    pub fn selected_metric(&self) -> Option<&str> {
        self.selected_metric.as_deref()
    }

    /// Feed one delta of the selected metric. Deltas of other metrics are ignored.
    pub fn on_delta(&mut self, delta: DeltaEvent, observed_at: DateTime<Utc>) -> Option<TrackOutcome> {
        let metric = self.selected_metric.as_deref()?;
        if delta.metric != metric {
            return None;
        }

        let fold = self.metric_series.on_sample(observed_at, delta.delta)?;
        publish(&mut self.renderer, SeriesKind::Metric, &self.metric_series, fold);

        let triggered = self
            .alarm
            .check_alarm(self.metric_series.current_value(), &delta.metric);

        debug!(
            metric = %delta.metric,
            delta = delta.delta,
            bucket = fold.index,
            value = fold.value,
            triggered,
            "metric delta folded"
        );

        Some(TrackOutcome {
            delta,
            fold,
            triggered,
        })
    }

    /// Feed a change map as published on the channel.
    pub fn on_changes(
        &mut self,
        changes: &IndexMap<String, ValueChange>,
        observed_at: DateTime<Utc>,
    ) -> Option<TrackOutcome> {
        let metric = self.selected_metric.as_deref()?;
        let change = changes.get(metric)?;
        let delta = DeltaEvent::from_change(metric, change);
        self.on_delta(delta, observed_at)
    }

    /// Feed one raw price sample.
    pub fn on_price(&mut self, price: f64, observed_at: DateTime<Utc>) -> Option<FoldOutcome> {
        let fold = self.price_series.on_sample(observed_at, price)?;
        self.last_price = Some(price);
        publish(&mut self.renderer, SeriesKind::Price, &self.price_series, fold);
        Some(fold)
    }

    /// Process one channel record, stamped with the current clock time.
    pub fn on_record(&mut self, record: &ChannelRecord) -> RecordOutcome {
        let now = self.clock.now();
        match record {
            ChannelRecord::Extracted(record) => self
                .on_changes(&record.changes, now)
                .map(RecordOutcome::Metric)
                .unwrap_or(RecordOutcome::Ignored),
            ChannelRecord::Price(record) => self
                .on_price(record.price_data.value, now)
                .map(RecordOutcome::Price)
                .unwrap_or(RecordOutcome::Ignored),
        }
    }

    /// Create (or replace) the alarm rule, bound to `metric` or else the selected metric.
    pub fn create_alarm(
        &mut self,
        threshold: impl Into<Threshold>,
        is_absolute: bool,
        metric: Option<&str>,
    ) -> Result<&AlarmRule, FlowError> {
        let metric = match metric.or(self.selected_metric.as_deref()) {
            Some(metric) => metric.to_string(),
            None => return Err(FlowError::NoMetricSelected),
        };
        if !is_tracked_metric(&metric) {
            return Err(FlowError::UnknownMetric(metric));
        }

        Ok(self.alarm.create_alarm(threshold, is_absolute, metric))
    }

    pub fn delete_alarm(&mut self) {
        self.alarm.delete_alarm();
    }

    pub fn acknowledge_alarm(&mut self) {
        self.alarm.acknowledge_alarm();
    }

    pub fn alarm(&self) -> &AlarmEngine<C, N> {
        &self.alarm
    }

    pub fn alarm_mut(&mut self) -> &mut AlarmEngine<C, N> {
        &mut self.alarm
    }

    pub fn metric_series(&self) -> &MetricSeries {
        &self.metric_series
    }

    pub fn price_series(&self) -> &PriceSeries {
        &self.price_series
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Push a fold to the renderer: the whole window when it was replaced, one point otherwise.
fn publish<P, R>(renderer: &mut R, kind: SeriesKind, series: &SeriesAggregator<P>, fold: FoldOutcome)
where
    P: FoldPolicy,
    R: ChartRenderer,
{
    let Some(window) = series.window() else {
        return;
    };

    if fold.window_replaced {
        renderer.replace_points(kind, window.buckets());
    } else if let Some(bucket) = window.bucket(fold.index) {
        renderer.update_point(kind, fold.index, *bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarm::AlarmState,
        channel::{ExtractedDataRecord, PriceDataRecord, PriceSample},
        chart::{AxisScale, BucketChart},
        clock::ManualClock,
        notifier::SilentNotifier,
        window::Bucket,
    };
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    /// Renderer recording every call.
    #[derive(Debug, Default)]
    struct RecordingRenderer {
        replaced: Vec<(SeriesKind, Vec<Bucket>)>,
        updated: Vec<(SeriesKind, usize, Bucket)>,
        cleared: Vec<SeriesKind>,
    }

    impl ChartRenderer for RecordingRenderer {
        fn clear(&mut self, series: SeriesKind) {
            self.cleared.push(series);
        }

        fn replace_points(&mut self, series: SeriesKind, points: &[Bucket]) {
            self.replaced.push((series, points.to_vec()));
        }

        fn update_point(&mut self, series: SeriesKind, index: usize, point: Bucket) {
            self.updated.push((series, index, point));
        }
    }

    type TestTracker = Tracker<Arc<ManualClock>, SilentNotifier, RecordingRenderer>;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 35, 5).unwrap()
    }

    fn tracker() -> (Arc<ManualClock>, TestTracker) {
        let clock = Arc::new(ManualClock::new(start()));
        let tracker = Tracker::new(
            Arc::clone(&clock),
            WindowGeometry::default(),
            SilentNotifier::default(),
            RecordingRenderer::default(),
        );
        (clock, tracker)
    }

    fn change(from: &str, to: &str) -> IndexMap<String, ValueChange> {
        let mut changes = IndexMap::new();
        changes.insert(
            "SmartFlow".to_string(),
            ValueChange {
                from: Some(from.to_string()),
                to: to.to_string(),
            },
        );
        changes
    }

    #[test]
    fn test_select_metric_publishes_empty_window() {
        let (_, mut tracker) = tracker();
        tracker.select_metric("SmartFlow").unwrap();

        assert_eq!(tracker.selected_metric(), Some("SmartFlow"));
        assert_eq!(tracker.renderer().cleared, vec![SeriesKind::Metric]);
        let (kind, points) = &tracker.renderer().replaced[0];
        assert_eq!(*kind, SeriesKind::Metric);
        assert_eq!(points.len(), 5);
        assert!(points.iter().all(|p| p.value == 0.0));
    }

    #[test]
    fn test_select_unknown_metric_fails() {
        let (_, mut tracker) = tracker();
        assert_eq!(
            tracker.select_metric("Vanna"),
            Err(FlowError::UnknownMetric("Vanna".to_string()))
        );
        assert_eq!(tracker.selected_metric(), None);
    }

    #[test]
    fn test_changes_fold_update_chart_and_trigger_alarm() {
        let (clock, mut tracker) = tracker();
        tracker.select_metric("SmartFlow").unwrap();
        tracker.create_alarm("2m", false, None).unwrap();

        let first = tracker.on_changes(&change("1,000,000", "2,500,000"), clock.now()).unwrap();
        assert_eq!(first.delta.delta, 1_500_000.0);
        assert!(!first.triggered);

        clock.advance(Duration::seconds(5));
        let second = tracker.on_changes(&change("2,500,000", "3,100,000"), clock.now()).unwrap();
        assert_eq!(second.fold.value, 2_100_000.0);
        assert!(second.triggered);

        let updated = &tracker.renderer().updated;
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[1], (SeriesKind::Metric, 0, Bucket {
            time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 35, 0).unwrap(),
            value: 2_100_000.0,
        }));
        assert_eq!(tracker.alarm().state(), AlarmState::Triggered);
        assert!(tracker.alarm().notifier().is_playing());

        tracker.acknowledge_alarm();
        assert!(!tracker.alarm().notifier().is_playing());
    }

    #[test]
    fn test_changes_for_other_metrics_are_ignored() {
        let (clock, mut tracker) = tracker();
        assert!(tracker.on_changes(&change("1", "2"), clock.now()).is_none());

        tracker.select_metric("MomoFlow").unwrap();
        assert!(tracker.on_changes(&change("1", "2"), clock.now()).is_none());
        assert_eq!(tracker.metric_series().current_value(), 0.0);
    }

    #[test]
    fn test_alarm_bound_to_other_metric_does_not_fire() {
        let (clock, mut tracker) = tracker();
        tracker.select_metric("SmartFlow").unwrap();
        tracker.create_alarm(1.0, false, Some("NOFA")).unwrap();

        let outcome = tracker.on_changes(&change("0", "100"), clock.now()).unwrap();
        assert!(!outcome.triggered);
        assert!(tracker.alarm().trigger_history().is_empty());
    }

    #[test]
    fn test_create_alarm_requires_metric() {
        let (_, mut tracker) = tracker();
        assert_eq!(
            tracker.create_alarm(1.0, false, None).err(),
            Some(FlowError::NoMetricSelected)
        );
        assert!(matches!(
            tracker.create_alarm(1.0, false, Some("bogus")),
            Err(FlowError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_rollover_replaces_chart_points() {
        let (clock, mut tracker) = tracker();
        tracker.select_metric("SmartFlow").unwrap();
        tracker.on_changes(&change("0", "10"), clock.now());

        clock.advance(Duration::minutes(6));
        let outcome = tracker.on_changes(&change("10", "15"), clock.now()).unwrap();
        assert!(outcome.fold.window_replaced);

        let (_, points) = tracker.renderer().replaced.last().unwrap();
        assert_eq!(points[0].time, Utc.with_ymd_and_hms(2024, 3, 1, 9, 40, 0).unwrap());
        assert_eq!(points[1].value, 5.0);
    }

    #[test]
    fn test_price_records_fold_percent_change() {
        let (clock, mut tracker) = tracker();
        let record = |value: f64| {
            ChannelRecord::from(PriceDataRecord {
                price_data: PriceSample {
                    value,
                    timestamp: start(),
                },
            })
        };

        assert!(matches!(tracker.on_record(&record(100.0)), RecordOutcome::Price(f) if f.window_replaced));
        clock.advance(Duration::seconds(10));
        let RecordOutcome::Price(fold) = tracker.on_record(&record(102.0)) else {
            panic!("expected price fold");
        };
        assert!((fold.value - 2.0).abs() < 1e-9);
        assert_eq!(tracker.last_price(), Some(102.0));
    }

    #[test]
    fn test_extracted_record_drives_metric() {
        let (_, mut tracker) = tracker();
        tracker.select_metric("SmartFlow").unwrap();

        let record = ChannelRecord::from(ExtractedDataRecord {
            extracted_data: IndexMap::new(),
            timestamp: start(),
            changes: change("5", "12"),
        });
        let RecordOutcome::Metric(outcome) = tracker.on_record(&record) else {
            panic!("expected metric outcome");
        };
        assert_eq!(outcome.fold.value, 7.0);

        let empty = ChannelRecord::from(ExtractedDataRecord {
            extracted_data: IndexMap::new(),
            timestamp: start(),
            changes: IndexMap::new(),
        });
        assert_eq!(tracker.on_record(&empty), RecordOutcome::Ignored);
    }

    #[test]
    fn test_stop_tracking_keeps_alarm_rule() {
        let (_, mut tracker) = tracker();
        tracker.select_metric("SmartFlow").unwrap();
        tracker.create_alarm(1.0, true, None).unwrap();

        tracker.stop_tracking();
        assert_eq!(tracker.selected_metric(), None);
        assert!(tracker.metric_series().window().is_none());
        assert!(tracker.alarm().current_alarm().is_some());

        tracker.delete_alarm();
        assert_eq!(tracker.alarm().state(), AlarmState::NoAlarm);
    }

    #[test]
    fn test_bucket_chart_renderer_end_to_end() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut tracker = Tracker::new(
            Arc::clone(&clock),
            WindowGeometry::default(),
            SilentNotifier::default(),
            BucketChart::new(AxisScale::new(5_000_000.0, 20_000_000.0), AxisScale::new(0.25, 1.0)),
        );
        tracker.select_metric("SmartFlow").unwrap();
        tracker.on_changes(&change("0", "26,000,000"), clock.now());

        let series = tracker.renderer().series(SeriesKind::Metric);
        assert_eq!(series.points()[0].value, 26_000_000.0);
        assert_eq!(series.scale().max(), 30_000_000.0);
    }
}
