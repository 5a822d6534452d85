//! WebSocket transport channel with explicit lifecycle

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Channel lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events delivered to the channel owner, in arrival order
#[derive(Debug)]
pub enum ChannelEvent {
    /// Connection established
    Open,
    /// Inbound text payload (raw JSON, parsed by the router)
    Message(String),
    /// Transport failure; the channel is closed afterwards
    Error(String),
    /// Remote closed the connection
    Closed,
}

/// Convert a PCM frame to little-endian wire bytes
pub fn frame_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Session-end control message sent before channel closure
pub fn eof_message() -> String {
    serde_json::json!({ "eof": 1 }).to_string()
}

struct Inner {
    state: RwLock<ChannelState>,
    sink: Mutex<WsSink>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

/// Persistent streaming connection to the recognition backend
///
/// Cloneable handle over shared state; `connect` returns the handle plus the
/// event receiver. Dropping the receiver deterministically unsubscribes (the
/// read task exits on the next inbound message).
#[derive(Clone)]
pub struct TransportChannel {
    inner: Arc<Inner>,
}

impl TransportChannel {
    /// Connect to the recognizer and start the inbound reader.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>)> {
        debug!("Connecting to recognizer at {}", url);

        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (sink, mut stream) = ws.split();

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            state: RwLock::new(ChannelState::Open),
            sink: Mutex::new(sink),
            read_task: Mutex::new(None),
        });

        let _ = event_tx.send(ChannelEvent::Open);
        info!("Recognizer channel open ({})", url);

        let reader_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let mut remote_closed = false;
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if event_tx.send(ChannelEvent::Message(text)).is_err() {
                            debug!("Event receiver dropped, stopping channel reader");
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        remote_closed = true;
                        break;
                    }
                    Ok(Message::Binary(payload)) => {
                        debug!("Ignoring unexpected {}-byte binary message", payload.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        *reader_inner.state.write().await = ChannelState::Closed;
                        warn!("Recognizer channel error: {}", e);
                        let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                        return;
                    }
                }
            }

            let mut state = reader_inner.state.write().await;
            let was_closing = *state == ChannelState::Closing || *state == ChannelState::Closed;
            *state = ChannelState::Closed;
            drop(state);

            if remote_closed || !was_closing {
                let _ = event_tx.send(ChannelEvent::Closed);
            }
        });
        *inner.read_task.lock().await = Some(task);

        Ok((Self { inner }, event_rx))
    }

    pub async fn state(&self) -> ChannelState {
        *self.inner.state.read().await
    }

    /// Send one PCM frame. Only valid while the channel is open.
    pub async fn send_frame(&self, samples: &[i16]) -> Result<()> {
        self.ensure_open().await?;
        self.send_message(Message::Binary(frame_to_bytes(samples)))
            .await
    }

    /// Send a plain-text timestamp marker (epoch milliseconds).
    pub async fn send_timestamp_marker(&self) -> Result<()> {
        self.ensure_open().await?;
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        self.send_message(Message::Text(epoch_ms.to_string())).await
    }

    /// Send the `{"eof": 1}` control message, then close the connection.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            if *state == ChannelState::Closed || *state == ChannelState::Closing {
                return Ok(());
            }
            *state = ChannelState::Closing;
        }

        let mut sink = self.inner.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(eof_message())).await {
            debug!("Failed to send eof message: {}", e);
        }
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!("Failed to send close frame: {}", e);
        }
        drop(sink);

        *self.inner.state.write().await = ChannelState::Closed;

        if let Some(task) = self.inner.read_task.lock().await.take() {
            // Give the server a moment to acknowledge, then stop reading.
            let _ = tokio::time::timeout(std::time::Duration::from_secs(1), task).await;
        }

        info!("Recognizer channel closed");
        Ok(())
    }

    async fn ensure_open(&self) -> Result<()> {
        let state = *self.inner.state.read().await;
        if state != ChannelState::Open {
            return Err(ChannelError::NotOpen(state));
        }
        Ok(())
    }

    async fn send_message(&self, message: Message) -> Result<()> {
        let mut sink = self.inner.sink.lock().await;
        if let Err(e) = sink.send(message).await {
            // A failed send means the transport is gone.
            *self.inner.state.write().await = ChannelState::Closed;
            return Err(ChannelError::Transport(e.to_string()));
        }
        Ok(())
    }
}
