/// Flowwatch terminal display
///
/// Tracks one sentiment metric in rolling bucket windows next to the price, with
/// a single threshold alarm sounded through the terminal bell.
use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, Write},
    sync::Mutex,
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use flowwatch_core::{FlowConfig, SystemClock, Tone};
use flowwatch_tui::{App, AppAction, WebSocketClient, WebSocketConfig, render_ui};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Get relay URL from WS_URL env var (default: ws://127.0.0.1:9002)
fn get_ws_url() -> String {
    std::env::var("WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:9002".to_string())
}

/// Get the metric to track on startup from FLOWWATCH_METRIC (default: none)
fn get_initial_metric() -> Option<String> {
    std::env::var("FLOWWATCH_METRIC")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Get log file path from FLOWWATCH_LOG env var (default: flowwatch.log)
fn get_log_path() -> String {
    std::env::var("FLOWWATCH_LOG").unwrap_or_else(|_| "flowwatch.log".to_string())
}

/// Log to a file so the alternate screen stays clean
fn init_logging() -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(get_log_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// Ring the terminal bell at the start of every high tone.
fn sound(tone: Tone) -> io::Result<()> {
    if tone.volume > 0.0 && tone.sequence % 2 == 0 {
        let mut stdout = io::stdout();
        stdout.write_all(b"\x07")?;
        stdout.flush()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging()?;

    let config = FlowConfig::from_env()?;
    let mut app = App::new(SystemClock, &config)?;
    if let Some(metric) = get_initial_metric() {
        if let Err(error) = app.select_metric(&metric) {
            warn!(%error, "ignoring FLOWWATCH_METRIC");
        }
    }

    let ws_url = get_ws_url();
    info!(%ws_url, ?config, "Starting flowwatch");
    let client = WebSocketClient::with_config(WebSocketConfig::new(ws_url));
    let (mut record_rx, mut status_rx) = client.start();

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Short tick so tone changes are not missed
    let tick_rate = Duration::from_millis(50);

    loop {
        // Each record is folded, checked and charted before the next
        while let Ok(record) = record_rx.try_recv() {
            app.on_record(&record);
        }
        while let Ok(status) = status_rx.try_recv() {
            app.set_connection(status);
        }

        if let Some(tone) = app.tick() {
            sound(tone)?;
        }

        terminal.draw(|f| render_ui(f, &app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key) == AppAction::Quit {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!("flowwatch stopped");
    Ok(())
}
