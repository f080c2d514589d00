//! Display-context state: the tracker plus what the terminal UI keeps around it
//! (metric selector, threshold input, status line, alarm flash).

use crate::shared::websocket::ConnectionStatus;
use chrono::{DateTime, Duration, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use flowwatch_core::{
    AlarmState, AudioNotifier, BucketChart, ChannelRecord, Clock, FlowConfig, FlowError,
    RecordOutcome, Snapshot, TRACKED_METRICS, Tone, ToneAlarm, Tracker, format_compact,
    parse_threshold,
};
use tracing::{info, warn};

/// Volume change per key press.
pub const VOLUME_STEP: f64 = 0.1;

/// How long the screen flashes after a trigger.
const FLASH_MS: i64 = 3000;

pub type DisplayTracker<C> = Tracker<C, ToneAlarm<C>, BucketChart>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    EditingThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Continue,
    Quit,
}

#[derive(Debug)]
pub struct App<C> {
    tracker: DisplayTracker<C>,
    metric_index: Option<usize>,
    input_mode: InputMode,
    threshold_input: String,
    is_absolute: bool,
    status: Option<String>,
    connection: ConnectionStatus,
    latest_snapshot: Snapshot,
    history_display: usize,
    flash_until: Option<DateTime<Utc>>,
}

impl<C> App<C>
where
    C: Clock + Clone,
{
    pub fn new(clock: C, config: &FlowConfig) -> Result<Self, FlowError> {
        let geometry = config.geometry()?;
        let notifier = ToneAlarm::new(clock.clone(), config.tone);
        let chart = BucketChart::new(config.metric_axis.scale(), config.price_axis.scale());

        Ok(Self {
            tracker: Tracker::new(clock, geometry, notifier, chart),
            metric_index: None,
            input_mode: InputMode::Normal,
            threshold_input: String::new(),
            is_absolute: false,
            status: None,
            connection: ConnectionStatus::default(),
            latest_snapshot: Snapshot::default(),
            history_display: config.history_display,
            flash_until: None,
        })
    }

    pub fn select_metric(&mut self, metric: &str) -> Result<(), FlowError> {
        self.tracker.select_metric(metric)?;
        self.metric_index = TRACKED_METRICS.iter().position(|m| *m == metric);
        self.status = Some(format!("Tracking {metric}"));
        Ok(())
    }

    /// Move the selector one step through the metric catalogue, wrapping.
    pub fn cycle_metric(&mut self, forward: bool) {
        let len = TRACKED_METRICS.len();
        let next = match (self.metric_index, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(index), true) => (index + 1) % len,
            (Some(index), false) => (index + len - 1) % len,
        };

        if let Err(error) = self.select_metric(TRACKED_METRICS[next]) {
            warn!(%error, "failed to switch metric");
            self.status = Some(error.to_string());
        }
    }

    pub fn stop_tracking(&mut self) {
        self.tracker.stop_tracking();
        self.metric_index = None;
        self.status = Some("Tracking stopped".to_string());
    }

    pub fn on_record(&mut self, record: &ChannelRecord) {
        if let ChannelRecord::Extracted(extracted) = record {
            self.latest_snapshot = extracted.extracted_data.clone();
        }

        if let RecordOutcome::Metric(outcome) = self.tracker.on_record(record) {
            if outcome.triggered {
                let now = self.tracker.clock().now();
                self.flash_until = Some(now + Duration::milliseconds(FLASH_MS));
                self.status = Some(format!(
                    "ALARM: {} at {}",
                    outcome.delta.metric,
                    format_compact(outcome.fold.value)
                ));
            }
        }
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection != status {
            info!(?status, "relay connection status changed");
        }
        self.connection = status;
    }

    /// Advance the alarm sound. Returns a tone the caller should sound now.
    pub fn tick(&mut self) -> Option<Tone> {
        self.tracker.alarm_mut().notifier_mut().poll()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return AppAction::Quit;
        }

        match self.input_mode {
            InputMode::EditingThreshold => self.handle_input_key(key.code),
            InputMode::Normal => return self.handle_normal_key(key.code),
        }
        AppAction::Continue
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> AppAction {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return AppAction::Quit,
            KeyCode::Tab | KeyCode::Right | KeyCode::Down => self.cycle_metric(true),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Up => self.cycle_metric(false),
            KeyCode::Char('s') => self.stop_tracking(),
            KeyCode::Char('t') | KeyCode::Enter => {
                self.input_mode = InputMode::EditingThreshold;
                self.threshold_input.clear();
            }
            KeyCode::Char('a') => {
                self.is_absolute = !self.is_absolute;
                self.status = Some(format!(
                    "Absolute mode {}",
                    if self.is_absolute { "on" } else { "off" }
                ));
            }
            KeyCode::Char('d') => {
                self.tracker.delete_alarm();
                self.status = Some("Alarm deleted".to_string());
            }
            KeyCode::Char(' ') => self.acknowledge(),
            KeyCode::Char('p') => self.toggle_pause(),
            KeyCode::Char('c') => {
                self.tracker.alarm_mut().clear_trigger_history();
                self.status = Some("Trigger history cleared".to_string());
            }
            KeyCode::Char('x') => {
                self.tracker.alarm_mut().notifier_mut().test_alarm();
                self.status = Some("Testing alarm sound".to_string());
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.change_volume(VOLUME_STEP),
            KeyCode::Char('-') => self.change_volume(-VOLUME_STEP),
            _ => {}
        }
        AppAction::Continue
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => {
                self.submit_threshold();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.threshold_input.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Backspace => {
                self.threshold_input.pop();
            }
            KeyCode::Char(c) if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') => {
                self.threshold_input.push(c);
            }
            _ => {}
        }
    }

    fn submit_threshold(&mut self) {
        let input = std::mem::take(&mut self.threshold_input);
        let input = input.trim();
        if input.is_empty() {
            self.status = Some("Enter a threshold value".to_string());
            return;
        }

        let threshold = parse_threshold(input);
        let looks_non_zero = input.chars().any(|c| c.is_ascii_digit() && c != '0');

        match self.tracker.create_alarm(threshold, self.is_absolute, None) {
            Ok(rule) => {
                let mut status = format!("Alarm set: {} {}", rule.metric, rule.describe());
                if threshold == 0.0 && looks_non_zero {
                    status = format!("'{input}' parsed as 0. {status}");
                }
                self.status = Some(status);
            }
            Err(error) => self.status = Some(error.to_string()),
        }
    }

    fn acknowledge(&mut self) {
        let sounding = self.tracker.alarm().notifier().is_playing();
        if self.tracker.alarm().state() != AlarmState::Triggered && !sounding {
            self.status = Some("No triggered alarm".to_string());
            return;
        }

        self.tracker.acknowledge_alarm();
        self.flash_until = None;
        self.status = Some("Alarm acknowledged".to_string());
    }

    fn toggle_pause(&mut self) {
        let active = self
            .tracker
            .alarm()
            .current_alarm()
            .map(|rule| !rule.is_active);

        match active {
            Some(active) => {
                self.tracker.alarm_mut().set_alarm_active(active);
                self.status = Some(if active { "Alarm resumed" } else { "Alarm paused" }.to_string());
            }
            None => self.status = Some("No alarm set".to_string()),
        }
    }

    fn change_volume(&mut self, delta: f64) {
        let notifier = self.tracker.alarm_mut().notifier_mut();
        notifier.set_volume(notifier.volume() + delta);
        let volume = notifier.volume();
        self.status = Some(format!("Volume {:.0}%", volume * 100.0));
    }

    /// Alarm just fired, or is still sounding.
    pub fn is_flashing(&self) -> bool {
        let now = self.tracker.clock().now();
        self.flash_until.is_some_and(|until| now < until)
            || self.tracker.alarm().notifier().is_playing()
    }

    pub fn tracker(&self) -> &DisplayTracker<C> {
        &self.tracker
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn threshold_input(&self) -> &str {
        &self.threshold_input
    }

    pub fn is_absolute(&self) -> bool {
        self.is_absolute
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn history_display(&self) -> usize {
        self.history_display
    }

    /// Latest raw string of the selected metric.
    pub fn selected_raw_value(&self) -> Option<&str> {
        let metric = self.tracker.selected_metric()?;
        self.latest_snapshot.get(metric).map(String::as_str)
    }
}
