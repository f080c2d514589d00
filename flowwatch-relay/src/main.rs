mod relay;

use crate::relay::{Relay, broadcast_record};
use chrono::Utc;
use flowwatch_core::{ChannelRecord, FlowError, SourceMessage};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::{error::Error, net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const DEFAULT_WS_PORT: u16 = 9002;
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    init_logging();

    info!("Starting flowwatch relay");

    // Configurable buffer size via WS_BUFFER_SIZE env var (default: 1024)
    let buffer_size = std::env::var("WS_BUFFER_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(DEFAULT_BUFFER_SIZE);

    // Configurable via WS_ADDR env var (default: 0.0.0.0:9002)
    let server_addr = std::env::var("WS_ADDR")
        .ok()
        .and_then(|s| s.parse::<SocketAddr>().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_WS_PORT)));

    info!(buffer_size, "broadcast buffer configured");
    let (tx, _rx) = broadcast::channel::<ChannelRecord>(buffer_size);
    let (source_tx, source_rx) = mpsc::channel::<SourceMessage>(buffer_size);
    let relay = Arc::new(Mutex::new(Relay::new()));

    tokio::spawn(run_relay(source_rx, Arc::clone(&relay), tx.clone()));

    let listener = TcpListener::bind(&server_addr).await?;
    info!("Relay listening on ws://{}", server_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!(%peer_addr, "new connection");
                    tokio::spawn(handle_client(
                        stream,
                        peer_addr,
                        tx.clone(),
                        source_tx.clone(),
                        Arc::clone(&relay),
                    ));
                }
                Err(error) => warn!(%error, "failed to accept connection"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down flowwatch relay");
                break;
            }
        }
    }

    Ok(())
}

/// Stamp, diff and broadcast source messages in arrival order.
async fn run_relay(
    mut source_rx: mpsc::Receiver<SourceMessage>,
    relay: Arc<Mutex<Relay>>,
    tx: broadcast::Sender<ChannelRecord>,
) {
    while let Some(message) = source_rx.recv().await {
        let record = relay.lock().on_source(message, Utc::now());
        if let Some(record) = record {
            let receivers = broadcast_record(&tx, record);
            debug!(receivers, "record broadcast");
        }
    }
    info!("Source channel closed");
}

/// Handle one connection. Any peer may push [`SourceMessage`]s and every peer
/// receives the broadcast records.
async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    tx: broadcast::Sender<ChannelRecord>,
    source_tx: mpsc::Sender<SourceMessage>,
    relay: Arc<Mutex<Relay>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", peer_addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut rx = tx.subscribe();

    // Send welcome message
    let welcome = serde_json::json!({
        "type": "welcome",
        "message": "Connected to flowwatch relay",
        "timestamp": Utc::now()
    });
    if let Ok(msg) = serde_json::to_string(&welcome) {
        let _ = ws_sender.send(Message::Text(msg.into())).await;
    }

    // Bring the client up to date before live records
    let replay = relay.lock().replay();
    for record in replay {
        if let Ok(json) = record.encode() {
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => match record.encode() {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => warn!(%error, "failed to encode record"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Slow display client: keep it connected
                    warn!("Client {} lagged, skipped {} records", peer_addr, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Broadcast channel closed for {}", peer_addr);
                    break;
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => match SourceMessage::decode(text.as_str()) {
                    Ok(message) => {
                        if source_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => debug!(%peer_addr, %error, "ignoring non-source message"),
                },
                Ok(Message::Ping(_)) => debug!("Received ping from {}", peer_addr),
                Err(e) => {
                    let error = FlowError::Socket(e.to_string());
                    if error.is_terminal() {
                        info!(%peer_addr, %error, "connection dropped");
                    } else {
                        error!(%peer_addr, %error, "WebSocket error");
                    }
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket connection closed for {}", peer_addr);
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
