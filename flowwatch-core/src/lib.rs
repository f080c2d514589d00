//! Flowwatch Core
//!
//! Windowed metric aggregation and a single-rule threshold alarm for market
//! sentiment flows scraped from a sentiment page.
//!
//! The library includes:
//! - Threshold parsing (`"2.5m"`, `"-100k"`) and compact value formatting
//! - Epoch-aligned window boundaries and bucket indexing
//! - Rolling bucket windows with additive and percentage-change fold policies
//! - An alarm engine that fires at most once per window boundary
//! - Snapshot diffing and the channel wire formats shared by the relay and TUI
//!
//! [`Tracker`] ties these together: it consumes [`ChannelRecord`]s, folds them
//! into the metric and price series, checks the alarm and pushes points to a
//! [`ChartRenderer`].

pub mod alarm;
pub mod boundary;
pub mod channel;
pub mod chart;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod notifier;
pub mod snapshot;
pub mod threshold;
pub mod tracker;
pub mod window;

// Re-export commonly used types for convenience
pub use alarm::{AlarmEngine, AlarmRule, AlarmRuntimeState, AlarmState};
pub use boundary::{WindowGeometry, boundary_start, bucket_index};
pub use channel::{ChannelRecord, ExtractedDataRecord, PriceDataRecord, PriceSample, SourceMessage};
pub use chart::{AxisScale, BucketChart, ChartRenderer, SeriesKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FlowConfig;
pub use error::FlowError;
pub use history::{TriggerEvent, TriggerHistory};
pub use notifier::{AudioNotifier, SilentNotifier, Tone, ToneAlarm, TonePattern};
pub use snapshot::{
    DeltaEvent, Observation, RawValue, Snapshot, SnapshotDiffer, TRACKED_METRICS, ValueChange,
};
pub use threshold::{Threshold, evaluate_threshold, format_compact, parse_threshold};
pub use tracker::{RecordOutcome, TrackOutcome, Tracker};
pub use window::{Bucket, FoldOutcome, MetricSeries, PriceSeries, SeriesAggregator, Window};
