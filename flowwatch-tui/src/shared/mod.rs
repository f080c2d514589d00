/// Shared modules for the flowwatch terminal display
pub mod app;
pub mod websocket;
pub mod widget;
