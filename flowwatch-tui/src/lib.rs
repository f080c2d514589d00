/// Flowwatch TUI - Shared Library
///
/// This library backs the `flowwatch` binary:
/// - WebSocket client for the flowwatch relay
/// - Application state wrapping the core tracker (selector, threshold input, alarm flash)
/// - Ratatui rendering of the bucket charts, alarm panel and trigger history
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::app::{App, AppAction, DisplayTracker, InputMode};
pub use shared::websocket::{ConnectionStatus, RelayFrame, WebSocketClient, WebSocketConfig};
pub use shared::widget::render_ui;
