//! Call transport: the per-call audio/control WebSocket.
//!
//! Binary frames carry raw PCM, text frames carry JSON control messages.
//! The orchestrator talks to the transport through [`TransportConnector`]
//! so tests can substitute an in-memory channel pair.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};

use super::error::{RelayError, RelayResult};

// =============================================================================
// Frames
// =============================================================================

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// Raw PCM audio (binary frame)
    Audio(Bytes),
    /// JSON control message (text frame)
    Control(String),
    Ping(Bytes),
    Pong(Bytes),
}

impl TransportFrame {
    pub fn into_message(self) -> Message {
        match self {
            TransportFrame::Audio(data) => Message::Binary(data),
            TransportFrame::Control(text) => Message::Text(text.into()),
            TransportFrame::Ping(data) => Message::Ping(data),
            TransportFrame::Pong(data) => Message::Pong(data),
        }
    }
}

impl From<tungstenite::Error> for RelayError {
    fn from(err: tungstenite::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

/// Write half of an open transport.
pub type TransportSink = Pin<Box<dyn Sink<TransportFrame, Error = RelayError> + Send>>;

/// Read half of an open transport. Ends when the peer closes.
pub type TransportStream = BoxStream<'static, RelayResult<TransportFrame>>;

/// An open transport connection.
pub struct TransportConnection {
    pub sink: TransportSink,
    pub stream: TransportStream,
}

// =============================================================================
// Connectors
// =============================================================================

/// Opens transport connections.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Make a single connection attempt.
    async fn connect(&self, url: &str) -> RelayResult<TransportConnection>;
}

/// Transport connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

fn encode_frame(frame: TransportFrame) -> future::Ready<RelayResult<Message>> {
    future::ready(Ok(frame.into_message()))
}

fn decode_message(
    msg: Result<Message, tungstenite::Error>,
) -> future::Ready<Option<RelayResult<TransportFrame>>> {
    let frame = match msg {
        Ok(Message::Binary(data)) => Some(Ok(TransportFrame::Audio(data))),
        Ok(Message::Text(text)) => Some(Ok(TransportFrame::Control(text.to_string()))),
        Ok(Message::Ping(data)) => Some(Ok(TransportFrame::Ping(data))),
        Ok(Message::Pong(data)) => Some(Ok(TransportFrame::Pong(data))),
        Ok(Message::Close(_)) | Ok(Message::Frame(_)) => None,
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => None,
        Err(e) => Some(Err(RelayError::from(e))),
    };
    future::ready(frame)
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> RelayResult<TransportConnection> {
        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| {
                    RelayError::Connection(format!(
                        "timed out after {:?}",
                        self.connect_timeout
                    ))
                })?
                .map_err(|e| RelayError::Connection(e.to_string()))?;

        let (sink, stream) = ws.split();
        Ok(TransportConnection {
            sink: Box::pin(sink.with(encode_frame)),
            stream: stream.filter_map(decode_message).boxed(),
        })
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Fixed-delay retry policy for transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Connect, retrying with a fixed delay between attempts.
///
/// Fails with [`RelayError::Connection`] once every attempt has failed.
pub async fn connect_with_retry(
    connector: &dyn TransportConnector,
    url: &str,
    policy: &RetryPolicy,
) -> RelayResult<TransportConnection> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match connector.connect(url).await {
            Ok(connection) => {
                tracing::info!("WebSocket connected on attempt {}", attempt);
                return Ok(connection);
            }
            Err(e) => {
                tracing::warn!("WebSocket connection attempt {} failed: {}", attempt, e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(RelayError::Connection(format!(
        "failed to connect after {} attempts: {}",
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

// =============================================================================
// Keepalive
// =============================================================================

/// Ping/pong bookkeeping shared by the send and receive loops.
#[derive(Debug)]
pub struct Keepalive {
    interval: Duration,
    timeout: Duration,
    awaiting_pong: parking_lot::Mutex<Option<Instant>>,
}

impl Keepalive {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            awaiting_pong: parking_lot::Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the outstanding ping times out, if a ping is outstanding.
    pub fn pong_deadline(&self) -> Option<Instant> {
        let sent = *self.awaiting_pong.lock();
        sent.map(|sent| sent + self.timeout)
    }

    /// Fail if the outstanding ping went unanswered past its deadline.
    pub fn check_pong(&self, now: Instant) -> RelayResult<()> {
        match self.pong_deadline() {
            Some(deadline) if now >= deadline => Err(RelayError::Connection(format!(
                "keepalive ping not answered within {:?}",
                self.timeout
            ))),
            _ => Ok(()),
        }
    }

    /// Handle a ping tick at `now`.
    ///
    /// Returns `Ok(true)` when a new ping should be sent. At most one ping is
    /// outstanding at a time.
    pub fn on_tick(&self, now: Instant) -> RelayResult<bool> {
        self.check_pong(now)?;
        let mut awaiting = self.awaiting_pong.lock();
        if awaiting.is_some() {
            return Ok(false);
        }
        *awaiting = Some(now);
        Ok(true)
    }

    pub fn on_pong(&self) {
        *self.awaiting_pong.lock() = None;
    }
}
