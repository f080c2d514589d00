//! Ratatui rendering for the flowwatch screen: header, bucket charts, alarm
//! panel, trigger history and key help.

use crate::shared::{
    app::{App, InputMode},
    websocket::ConnectionStatus,
};
use chrono::Local;
use flowwatch_core::{
    AlarmState, AudioNotifier, AxisScale, Clock, SeriesKind, chart::ChartSeries, format_compact,
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph, Wrap},
};

const C_BUY: Color = Color::Rgb(100, 220, 100);
const C_SELL: Color = Color::Rgb(220, 100, 100);
const C_NEUTRAL: Color = Color::Rgb(180, 180, 100);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_ACCENT: Color = Color::Rgb(100, 180, 220);

/// Axis span maps onto this many bar units.
const BAR_RESOLUTION: f64 = 1000.0;

/// Bar height of `value` on a chart whose larger axis bound is full height.
pub fn bar_height(value: f64, scale: &AxisScale) -> u64 {
    let span = scale.max().abs().max(scale.min().abs());
    if span <= 0.0 || !value.is_finite() {
        return 0;
    }
    ((value.abs() / span) * BAR_RESOLUTION)
        .round()
        .min(BAR_RESOLUTION) as u64
}

pub fn format_percent(value: f64) -> String {
    format!("{value:+.2}%")
}

pub fn render_ui<C>(f: &mut Frame, app: &App<C>)
where
    C: Clock + Clone,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Percentage(35),
            Constraint::Percentage(30),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(f.area());

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[3]);

    let chart = app.tracker().renderer();
    let metric_title = app
        .tracker()
        .selected_metric()
        .unwrap_or("no metric")
        .to_string();

    render_header(f, app, chunks[0]);
    render_series(
        f,
        chunks[1],
        &metric_title,
        chart.series(SeriesKind::Metric),
        format_compact,
    );
    render_series(
        f,
        chunks[2],
        "price % (per bucket)",
        chart.series(SeriesKind::Price),
        format_percent,
    );
    render_alarm_panel(f, app, bottom[0]);
    render_history(f, app, bottom[1]);
    render_footer(f, app, chunks[4]);
}

fn render_header<C>(f: &mut Frame, app: &App<C>, area: Rect)
where
    C: Clock + Clone,
{
    let (status_text, status_color) = match app.connection() {
        ConnectionStatus::Connected => ("● LIVE", C_BUY),
        ConnectionStatus::Reconnecting => ("◌ RECONNECTING", C_NEUTRAL),
        ConnectionStatus::Disconnected => ("○ OFFLINE", C_SELL),
    };

    let tracker = app.tracker();
    let window = tracker
        .metric_series()
        .window()
        .map(|w| w.label_in(&Local))
        .unwrap_or_else(|| "--:-- - --:--".to_string());
    let price = tracker
        .last_price()
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "--".to_string());

    let line = Line::from(vec![
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  "),
        Span::styled(
            tracker.selected_metric().unwrap_or("select a metric (Tab)"),
            Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {}", app.selected_raw_value().unwrap_or("--")),
            Style::default().fg(C_ACCENT),
        ),
        Span::styled("  window ", Style::default().fg(C_DIM)),
        Span::styled(window, Style::default().fg(C_BRIGHT)),
        Span::styled("  price ", Style::default().fg(C_DIM)),
        Span::styled(price, Style::default().fg(C_BRIGHT)),
    ]);

    let block = Block::default()
        .title(" FLOWWATCH ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_series(
    f: &mut Frame,
    area: Rect,
    title: &str,
    series: &ChartSeries,
    format: impl Fn(f64) -> String,
) {
    let scale = series.scale();
    let block = Block::default()
        .title(format!(
            " {} [{} .. {}] ",
            title,
            format(scale.min()),
            format(scale.max())
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));

    if series.points().is_empty() {
        let placeholder = Line::from(Span::styled("Waiting for data...", Style::default().fg(C_DIM)));
        f.render_widget(Paragraph::new(placeholder).block(block), area);
        return;
    }

    let bars: Vec<Bar> = series
        .points()
        .iter()
        .map(|point| {
            let color = if point.value >= 0.0 { C_BUY } else { C_SELL };
            Bar::default()
                .value(bar_height(point.value, scale))
                .label(Line::from(
                    point.time.with_timezone(&Local).format("%H:%M").to_string(),
                ))
                .text_value(format(point.value))
                .style(Style::default().fg(color))
                .value_style(Style::default().fg(Color::Black).bg(color))
        })
        .collect();

    let count = bars.len().max(1) as u16;
    let bar_width = (area.width.saturating_sub(2) / count).saturating_sub(1).max(1);

    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1)
        .max(BAR_RESOLUTION as u64);
    f.render_widget(chart, area);
}

fn render_alarm_panel<C>(f: &mut Frame, app: &App<C>, area: Rect)
where
    C: Clock + Clone,
{
    let alarm = app.tracker().alarm();
    let state = alarm.state();
    let state_color = match state {
        AlarmState::NoAlarm => C_DIM,
        AlarmState::Armed => C_BUY,
        AlarmState::Triggered => C_SELL,
        AlarmState::Paused => C_NEUTRAL,
    };

    let mut border = Style::default().fg(C_ACCENT);
    if app.is_flashing() {
        border = Style::default().fg(C_BRIGHT).bg(C_SELL).add_modifier(Modifier::BOLD);
    }
    let block = Block::default()
        .title(" ALARM ")
        .borders(Borders::ALL)
        .border_style(border);

    let mut lines = vec![Line::from(vec![
        Span::styled("Status: ", Style::default().fg(C_DIM)),
        Span::styled(
            state.to_string(),
            Style::default().fg(state_color).add_modifier(Modifier::BOLD),
        ),
    ])];

    match alarm.current_alarm() {
        Some(rule) => {
            lines.push(Line::from(vec![
                Span::styled("Rule:   ", Style::default().fg(C_DIM)),
                Span::styled(
                    format!("{} {}", rule.metric, rule.describe()),
                    Style::default().fg(C_BRIGHT),
                ),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Now:    ", Style::default().fg(C_DIM)),
                Span::styled(
                    format_compact(app.tracker().metric_series().current_value()),
                    Style::default().fg(C_BRIGHT),
                ),
            ]));
        }
        None => lines.push(Line::from(Span::styled(
            "No alarm set. Press t to enter a threshold.",
            Style::default().fg(C_DIM),
        ))),
    }

    let notifier = alarm.notifier();
    let sound = match notifier.active_tone() {
        Some(tone) => format!("♪ {:.0} Hz", tone.frequency_hz),
        None if notifier.is_playing() => "♪".to_string(),
        None => "silent".to_string(),
    };
    lines.push(Line::from(vec![
        Span::styled("Mode:   ", Style::default().fg(C_DIM)),
        Span::styled(
            if app.is_absolute() { "absolute" } else { "directional" },
            Style::default().fg(C_ACCENT),
        ),
        Span::styled(
            format!("  vol {:.0}%  {}", notifier.volume() * 100.0, sound),
            Style::default().fg(C_DIM),
        ),
    ]));

    if app.input_mode() == InputMode::EditingThreshold {
        lines.push(Line::from(vec![
            Span::styled("Threshold> ", Style::default().fg(C_NEUTRAL)),
            Span::styled(
                format!("{}_", app.threshold_input()),
                Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
            ),
        ]));
    }

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn render_history<C>(f: &mut Frame, app: &App<C>, area: Rect)
where
    C: Clock + Clone,
{
    let history = app.tracker().alarm().trigger_history();
    let block = Block::default()
        .title(format!(" TRIGGERS ({}) ", history.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));

    let lines: Vec<Line> = if history.is_empty() {
        vec![Line::from(Span::styled("No triggers yet", Style::default().fg(C_DIM)))]
    } else {
        history
            .recent(app.history_display())
            .map(|event| {
                Line::from(vec![
                    Span::styled(event.summary(), Style::default().fg(C_BRIGHT)),
                    Span::styled(format!("  {}", event.metric), Style::default().fg(C_DIM)),
                ])
            })
            .collect()
    };

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_footer<C>(f: &mut Frame, app: &App<C>, area: Rect)
where
    C: Clock + Clone,
{
    let help = match app.input_mode() {
        InputMode::Normal => {
            "Tab metric  t threshold  a abs  d delete  space ack  p pause  c clear  x test  +/- vol  s stop  q quit"
        }
        InputMode::EditingThreshold => "Enter set  Esc cancel  e.g. 2.5m, -100k, 1b",
    };

    let mut spans = vec![Span::styled(help, Style::default().fg(C_DIM))];
    if let Some(status) = app.status() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.to_string(), Style::default().fg(C_NEUTRAL)));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_DIM));
    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}
