/// Relay subscription for the display
///
/// Keeps one connection to the flowwatch relay open, retrying after every drop,
/// and forwards decoded channel records to the UI loop.

use flowwatch_core::{ChannelRecord, FlowError};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Capacity of the connection status channel.
const STATUS_BUFFER: usize = 8;

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Relay endpoint, e.g. `ws://127.0.0.1:9002`
    pub url: String,
    /// Interval between heartbeat pings while connected
    pub heartbeat: Duration,
    /// Pause before the next connection attempt
    pub retry_delay: Duration,
    /// Records buffered for the UI loop before the reader waits
    pub record_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9002".to_string(),
            heartbeat: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            record_buffer: 1024,
        }
    }
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_record_buffer(mut self, record_buffer: usize) -> Self {
        self.record_buffer = record_buffer;
        self
    }
}

/// Relay link state shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Reconnecting,
}

/// One decoded text frame from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Welcome,
    Record(ChannelRecord),
}

/// Classify a text frame. Welcome messages are recognised by their `type` tag.
pub fn parse_frame(text: &str) -> Result<RelayFrame, FlowError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("type").and_then(|v| v.as_str()) == Some("welcome") {
        return Ok(RelayFrame::Welcome);
    }

    Ok(RelayFrame::Record(serde_json::from_value(value)?))
}

/// How one relay session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Relay closed or the socket failed; try again.
    Dropped,
    /// The UI stopped listening; stop for good.
    Abandoned,
}

#[derive(Debug, Clone, Default)]
pub struct WebSocketClient {
    config: WebSocketConfig,
}

impl WebSocketClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Spawn the subscription task.
    ///
    /// Returns the record stream and the connection status stream. The task
    /// ends once the record receiver is dropped.
    pub fn start(self) -> (mpsc::Receiver<ChannelRecord>, mpsc::Receiver<ConnectionStatus>) {
        let (record_tx, record_rx) = mpsc::channel(self.config.record_buffer.max(1));
        let (status_tx, status_rx) = mpsc::channel(STATUS_BUFFER);

        tokio::spawn(subscribe(self.config, record_tx, status_tx));

        (record_rx, status_rx)
    }
}

async fn subscribe(
    config: WebSocketConfig,
    record_tx: mpsc::Sender<ChannelRecord>,
    status_tx: mpsc::Sender<ConnectionStatus>,
) {
    info!(url = %config.url, "subscribing to relay");

    loop {
        let _ = status_tx.send(ConnectionStatus::Reconnecting).await;

        let end = match connect_async(config.url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %config.url, "relay connected");
                let _ = status_tx.send(ConnectionStatus::Connected).await;
                run_session(stream, config.heartbeat, &record_tx).await
            }
            Err(e) => {
                let error = FlowError::Socket(e.to_string());
                error!(url = %config.url, %error, "relay connection failed");
                SessionEnd::Dropped
            }
        };

        let _ = status_tx.send(ConnectionStatus::Disconnected).await;
        if end == SessionEnd::Abandoned {
            info!("record receiver dropped, relay subscription finished");
            return;
        }

        debug!(delay = ?config.retry_delay, "retrying relay connection");
        tokio::time::sleep(config.retry_delay).await;
    }
}

/// Read frames until the relay goes away or the UI stops listening.
async fn run_session<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    heartbeat: Duration,
    record_tx: &mpsc::Sender<ChannelRecord>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut frames) = stream.split();
    let heartbeat_task = spawn_heartbeat(sink, heartbeat);

    let end = loop {
        let Some(frame) = frames.next().await else {
            break SessionEnd::Dropped;
        };

        match frame {
            Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                Ok(RelayFrame::Welcome) => debug!("relay welcome received"),
                Ok(RelayFrame::Record(record)) => {
                    if record_tx.send(record).await.is_err() {
                        break SessionEnd::Abandoned;
                    }
                }
                Err(error) => warn!(%error, frame = text.as_str(), "skipping undecodable frame"),
            },
            Ok(Message::Close(reason)) => {
                info!(?reason, "relay closed the session");
                break SessionEnd::Dropped;
            }
            Ok(_) => {}
            Err(e) => {
                let error = FlowError::Socket(e.to_string());
                if error.is_terminal() {
                    warn!(%error, "relay session lost");
                } else {
                    error!(%error, "relay session failed");
                }
                break SessionEnd::Dropped;
            }
        }
    };

    heartbeat_task.abort();
    end
}

/// Ping the relay every `period` until a send fails or the task is aborted.
fn spawn_heartbeat<K>(mut sink: K, period: Duration) -> JoinHandle<()>
where
    K: futures::Sink<Message> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        // The first tick completes immediately
        ticks.tick().await;
        loop {
            ticks.tick().await;
            if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                debug!("heartbeat stopped, sink closed");
                return;
            }
        }
    })
}
